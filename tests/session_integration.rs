//! End-to-end tests of a pipeline session
//!
//! These tests drive uploads of CSV and XLSX inputs through every stage and
//! check what SQL, summaries and exports observe.

use chrono::NaiveDate;
use rusty_medallion::export_workbook;
use rusty_medallion::ColumnType;
use rusty_medallion::ExportFormat;
use rusty_medallion::FnRule;
use rusty_medallion::GoldOptions;
use rusty_medallion::IngestOptions;
use rusty_medallion::MedallionError;
use rusty_medallion::Session;
use rusty_medallion::SilverOptions;
use rusty_medallion::SilverTransform;
use rusty_medallion::SourceFormat;
use rusty_medallion::Stage;
use rusty_medallion::Table;
use rusty_medallion::Value;

const ENDPOINTS: &str = "\
Host Name,Status,Last Seen,Score
 alpha ,up,2024-01-05,1
beta,down,2024-01-06,2
alpha,up,2024-01-07,3
,up,2024-01-08,4
gamma,down,soon,5
";

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Silver transform dropping endpoints without a host name
fn transform() -> SilverTransform {
    SilverTransform::new(SilverOptions::default()).with_rule(FnRule::new(
        "drop_unnamed_hosts",
        |table: Table| -> Result<Table, MedallionError> {
            let host = table.require_column("host_name")?;
            Ok(table.filter_rows(|_, row| !row[host].is_null()))
        },
    ))
}

fn latest_per_host() -> GoldOptions {
    GoldOptions {
        columns: vec!["host_name".to_owned(), "last_seen".to_owned()],
        dedupe: true,
        dedupe_on: vec!["host_name".to_owned()],
        keep_latest_by: Some("last_seen".to_owned()),
        ..GoldOptions::default()
    }
}

fn csv_session() -> Session {
    let mut session = Session::new(transform());
    session
        .upload(ENDPOINTS.as_bytes(), SourceFormat::Csv, &IngestOptions::default())
        .unwrap();
    session.refine().unwrap();
    session.shape(&latest_per_host()).unwrap();
    session
}

#[test]
fn test_csv_through_all_stages() {
    let session = csv_session();
    let state = session.state();

    let bronze = state.get(Stage::Bronze).unwrap();
    assert_eq!(bronze.column_names(), vec!["Host Name", "Status", "Last Seen", "Score"]);
    assert_eq!(bronze.row_count(), 5);

    let silver = state.get(Stage::Silver).unwrap();
    assert_eq!(silver.column_names(), vec!["host_name", "status", "last_seen", "score"]);
    assert_eq!(silver.row_count(), 4);
    assert_eq!(silver.column("last_seen").unwrap().kind, ColumnType::Date);
    assert_eq!(silver.rows()[0][0], Value::from("alpha"));
    assert_eq!(silver.rows()[3][2], Value::Null);
    assert_eq!(session.coercion_failures().get("last_seen"), Some(&1));

    let gold = state.get(Stage::Gold).unwrap();
    assert_eq!(gold.column_names(), vec!["host_name", "last_seen"]);
    assert_eq!(
        gold.rows(),
        &[
            vec![Value::from("beta"), Value::Date(ymd(2024, 1, 6))],
            vec![Value::from("alpha"), Value::Date(ymd(2024, 1, 7))],
            vec![Value::from("gamma"), Value::Null],
        ]
    );
}

#[test]
fn test_query_and_summaries() {
    let session = csv_session();

    let count = session.query("SELECT COUNT(*) AS n FROM silver").unwrap();
    assert_eq!(count.column_names(), vec!["n"]);
    assert_eq!(count.rows(), &[vec![Value::BigInt(4)]]);

    let joined = session
        .query(
            "SELECT g.host_name, COUNT(*) AS seen FROM gold g \
             JOIN silver s USING (host_name) GROUP BY g.host_name ORDER BY seen DESC, g.host_name",
        )
        .unwrap();
    assert_eq!(joined.rows()[0], vec![Value::from("alpha"), Value::BigInt(2)]);
    assert_eq!(joined.row_count(), 3);

    let statuses = session.summarize(Stage::Silver, "status").unwrap();
    assert_eq!(statuses.column_names(), vec!["status", "count"]);
    assert_eq!(
        statuses.rows(),
        &[
            vec![Value::from("up"), Value::BigInt(2)],
            vec![Value::from("down"), Value::BigInt(2)],
        ]
    );
}

#[test]
fn test_failures_leave_state_untouched() {
    let mut session = csv_session();
    let before = session.state().clone();

    let error = session.query("SELECT * FROM platinum").unwrap_err();
    assert!(matches!(error, MedallionError::QueryError(_)));
    assert!(error.to_string().starts_with("Query error: "));

    let missing = GoldOptions {
        columns: vec!["owner".to_owned()],
        ..GoldOptions::default()
    };
    let error = session.shape(&missing).unwrap_err();
    assert!(matches!(error, MedallionError::SchemaError(_)));

    let error = session
        .upload(b"PK\x03\x04garbage", SourceFormat::Xlsx, &IngestOptions::default())
        .unwrap_err();
    assert!(matches!(error, MedallionError::FormatError(_)));

    assert_eq!(session.state(), &before);
}

#[test]
fn test_mutating_sql_runs_on_copies() {
    let session = csv_session();
    let before = session.state().clone();

    let deleted = session.query("DELETE FROM silver").unwrap();
    assert_eq!(deleted.rows(), &[vec![Value::BigInt(4)]]);
    session.query("UPDATE gold SET host_name = 'zeta'").unwrap();
    session.query("DROP TABLE gold").unwrap();
    session.query("CREATE TABLE scratch AS SELECT * FROM bronze").unwrap();
    assert_eq!(session.state(), &before);

    let count = session.query("SELECT COUNT(*) AS n FROM silver").unwrap();
    assert_eq!(count.rows(), &[vec![Value::BigInt(4)]]);
    let hosts = session.query("SELECT host_name FROM gold ORDER BY host_name").unwrap();
    assert_eq!(hosts.rows()[0], vec![Value::from("alpha")]);
    assert!(matches!(
        session.query("SELECT * FROM scratch"),
        Err(MedallionError::QueryError(_))
    ));
}

#[test]
fn test_actions_before_upload() {
    let mut session = Session::new(transform());
    let error = session.refine().unwrap_err();
    assert_eq!(error.to_string(), "Stage error: No bronze table; run upload first");

    let error = session.export(Stage::Gold, ExportFormat::Csv).unwrap_err();
    assert_eq!(error.to_string(), "Stage error: No gold table; run shape first");
}

#[test]
fn test_exports_of_each_format() {
    let session = csv_session();

    let csv = session.export(Stage::Gold, ExportFormat::Csv).unwrap();
    assert_eq!(
        String::from_utf8(csv).unwrap(),
        "host_name,last_seen\nbeta,2024-01-06\nalpha,2024-01-07\ngamma,\n"
    );

    let parquet = session.export(Stage::Silver, ExportFormat::Parquet).unwrap();
    assert!(parquet.starts_with(b"PAR1"));
    assert!(parquet.ends_with(b"PAR1"));

    let xlsx = session.export(Stage::Bronze, ExportFormat::Xlsx).unwrap();
    assert!(xlsx.starts_with(b"PK\x03\x04"));
}

#[test]
fn test_workbook_upload_keeps_types() {
    let first = csv_session();
    let silver = first.state().get(Stage::Silver).unwrap();
    let statuses = first.summarize(Stage::Silver, "status").unwrap();
    let workbook = export_workbook(&[("silver", silver), ("status", &statuses)]).unwrap();

    let options = IngestOptions {
        sheet: Some("silver".to_owned()),
        header_hint: vec!["host_name".to_owned()],
        ..IngestOptions::default()
    };
    let mut second = Session::new(SilverTransform::default());
    let bronze = second.upload(&workbook, SourceFormat::Xlsx, &options).unwrap();
    assert_eq!(bronze.column_names(), silver.column_names());
    assert_eq!(bronze.row_count(), silver.row_count());
    assert_eq!(bronze.column("last_seen").unwrap().kind, ColumnType::Date);

    second.refine().unwrap();
    second.shape(&latest_per_host()).unwrap();
    assert_eq!(second.state().get(Stage::Gold), first.state().get(Stage::Gold));

    let options = IngestOptions {
        sheet: Some("status".to_owned()),
        ..IngestOptions::default()
    };
    let mut third = Session::new(SilverTransform::default());
    let summary = third.upload(&workbook, SourceFormat::Xlsx, &options).unwrap();
    assert_eq!(summary.rows()[0][0], Value::from("up"));
}
