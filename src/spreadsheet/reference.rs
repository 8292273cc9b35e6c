//! A1-style cell references.

/// Converts a 0-based column index to its letters (`0` → `A`, `26` → `AA`).
pub(crate) fn index_to_column(mut col: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (col % 26) as u8);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Converts 0-based (row, col) to a cell reference such as `B3`.
pub(crate) fn index_to_reference(row: usize, col: usize) -> String {
    format!("{}{}", index_to_column(col), row + 1)
}

/// Parses a cell reference such as `B3` (or `$B$3`) into 0-based (row, col).
pub(crate) fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let reference = reference.trim().replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let mut col = 0usize;
    for letter in letters.bytes() {
        col = col
            .checked_mul(26)?
            .checked_add((letter.to_ascii_uppercase() - b'A') as usize + 1)?;
    }
    let row = digits.parse::<usize>().ok()?.checked_sub(1)?;
    Some((row, col - 1))
}
