//! Conversions between 0-based (row, column) indexes and A1-style references.

/// Rows in an Excel 2007+ worksheet
pub(crate) const MAX_ROWS: usize = 1_048_576;

/// Columns in an Excel 2007+ worksheet, `A` to `XFD`
pub(crate) const MAX_COLS: usize = 16_384;

/// Converts 0-based indexes to an A1 reference, e.g. `(1, 27)` to `AB2`.
pub(crate) fn index_to_reference(row: usize, col: usize) -> String {
    let mut letters = Vec::new();
    let mut col = col + 1;
    while col > 0 {
        col -= 1;
        letters.push(b'A' + (col % 26) as u8);
        col /= 26;
    }
    letters.reverse();
    let mut reference = String::from_utf8_lossy(&letters).into_owned();
    reference.push_str(&(row + 1).to_string());
    reference
}

/// Parses column letters (`A`, `AB`, case-insensitive) to a 0-based index.
/// Columns past `XFD` are rejected.
pub(crate) fn col_to_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    letters
        .chars()
        .try_fold(0usize, |index, letter| {
            let letter = letter.to_ascii_uppercase();
            if !letter.is_ascii_uppercase() {
                return None;
            }
            let index = index.checked_mul(26)?.checked_add(letter as usize - 'A' as usize + 1)?;
            (index <= MAX_COLS).then_some(index)
        })
        .map(|index| index - 1)
}

/// Parses a 1-based row number to a 0-based index; `0`, non-numbers and rows
/// past the worksheet limit are rejected.
pub(crate) fn row_to_index(digits: &str) -> Option<usize> {
    digits
        .parse::<usize>()
        .ok()
        .filter(|row| (1..=MAX_ROWS).contains(row))
        .map(|row| row - 1)
}

/// Parses a full cell reference like `B12` (optionally with `$` anchors) to 0-based indexes.
pub(crate) fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let reference = reference.replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    Some((row_to_index(digits)?, col_to_index(letters)?))
}
