use rust_xlsxwriter::{Format, Workbook};

use crate::error::{Error, Result};

/// One enrolled student's contact details for the roster sheet.
#[derive(Debug, Clone)]
pub struct RosterRow {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub address: String,
    pub email: String,
}

const HEADERS: &[&str] = &["First name", "Last name", "Phone", "Address", "Email"];

/// Builds the downloadable roster workbook for one course.
pub fn roster_workbook(course_name: &str, rows: &[RosterRow]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(sheet_name(course_name))
        .map_err(|e| Error::Export(e.to_string()))?;

    let bold = Format::new().set_bold();
    for (col, header) in HEADERS.iter().enumerate() {
        worksheet
            .write_with_format(0, col as u16, *header, &bold)
            .map_err(|e| Error::Export(e.to_string()))?;
    }

    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        let cells = [
            &row.first_name,
            &row.last_name,
            &row.phone,
            &row.address,
            &row.email,
        ];
        for (col, value) in cells.iter().enumerate() {
            worksheet
                .write(r, col as u16, value.as_str())
                .map_err(|e| Error::Export(e.to_string()))?;
        }
    }

    workbook
        .save_to_buffer()
        .map_err(|e| Error::Export(e.to_string()))
}

/// Excel limits sheet names to 31 chars and bans a handful of characters.
fn sheet_name(course_name: &str) -> String {
    let cleaned: String = course_name
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => ' ',
            other => other,
        })
        .collect();
    let trimmed = cleaned.trim();
    let name = if trimmed.is_empty() { "Roster" } else { trimmed };
    name.chars().take(31).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_workbook_builds() {
        let rows = vec![RosterRow {
            first_name: "Ayşe".to_string(),
            last_name: "Demir".to_string(),
            phone: "+90 555 000 00 00".to_string(),
            address: "Kadıköy, İstanbul".to_string(),
            email: "ayse@example.com".to_string(),
        }];
        let bytes = roster_workbook("German A1", &rows).unwrap();
        // XLSX files are zip archives; check the magic bytes.
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_sheet_name_sanitized_and_truncated() {
        assert_eq!(sheet_name("German A1"), "German A1");
        assert_eq!(sheet_name("A/B:C"), "A B C");
        assert_eq!(sheet_name(""), "Roster");
        assert_eq!(sheet_name(&"x".repeat(40)).len(), 31);
    }
}
