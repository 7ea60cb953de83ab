//! A1-notation helpers (`Sheet1!A2:K`, `FS!K17:M17`)

/// Sheet name part of a range, without quotes. `None` when the range has no `!`.
pub fn sheet_name(range: &str) -> Option<&str> {
    let (sheet, _) = range.rsplit_once('!')?;
    Some(sheet.trim_matches('\''))
}

/// First row referenced by a range: `FS!A2:A` -> 2, `FS!A:A` -> 1, `FS!K17:M17` -> 17
pub fn start_row(range: &str) -> Option<u32> {
    let cells = range.rsplit_once('!').map_or(range, |(_, cells)| cells);
    let first = cells.split(':').next()?;
    let digits: String = first.chars().skip_while(|c| c.is_ascii_alphabetic()).collect();

    if digits.is_empty() {
        // Whole-column reference starts at the first row
        if first.chars().all(|c| c.is_ascii_alphabetic()) && !first.is_empty() {
            return Some(1);
        }
        return None;
    }
    digits.parse().ok().filter(|row| *row > 0)
}

/// 1-based column index of a column label: `A` -> 1, `K` -> 11, `AA` -> 27
pub fn column_index(label: &str) -> Option<u32> {
    if label.is_empty() {
        return None;
    }
    label.chars().try_fold(0u32, |acc, c| {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = (c.to_ascii_uppercase() as u32) - ('A' as u32) + 1;
        acc.checked_mul(26)?.checked_add(digit)
    })
}

/// Column label of a 1-based index: 1 -> `A`, 13 -> `M`, 28 -> `AB`
pub fn column_label(mut index: u32) -> Option<String> {
    if index == 0 {
        return None;
    }
    let mut label = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        label.push((b'A' + rem as u8) as char);
        index = (index - 1) / 26;
    }
    Some(label.into_iter().rev().collect())
}

/// Range covering `width` cells of one row starting at `first_column`
pub fn row_span(sheet: &str, first_column: &str, width: u32, row: u32) -> Option<String> {
    let start = column_index(first_column)?;
    let end = column_label(start.checked_add(width.checked_sub(1)?)?)?;
    Some(format!(
        "{}!{}{}:{}{}",
        quote_sheet(sheet),
        first_column.to_ascii_uppercase(),
        row,
        end,
        row
    ))
}

/// Quote a sheet name for use in a range when it contains anything but `[A-Za-z0-9_]`
pub fn quote_sheet(sheet: &str) -> String {
    if sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        sheet.to_string()
    } else {
        format!("'{}'", sheet.replace('\'', "''"))
    }
}
