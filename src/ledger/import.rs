use std::io::Cursor;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::Payment;

/// Dates cross the preview/commit boundary in the format the bank exports use.
pub const DISPLAY_DATE_FORMAT: &str = "%d.%m.%Y";

pub const ALLOWED_EXTENSIONS: &[&str] = &[".xlsx", ".xls"];

// Header-name variants seen across bank statement exports. Resolution is by
// exact match after trimming; Turkish variants come from the banks this was
// built for, English ones from re-exported sheets.
const DATE_HEADERS: &[&str] = &["Tarih", "TARIH", "Date", "date"];
const DESCRIPTION_HEADERS: &[&str] = &["Açıklama", "ACIKLAMA", "Description", "description"];
const AMOUNT_HEADERS: &[&str] = &[
    "İşlem Tutarı (TL)",
    "İŞLEM TUTARI (TL)",
    "Amount (TL)",
    "amount (tl)",
    "İşlem Tutarı",
    "İŞLEM TUTARI",
    "Tutar",
    "TUTAR",
    "Amount",
    "amount",
];

/// One candidate row from an uploaded statement, ready for the admin to
/// accept or skip. `exists` flags rows already present in the ledger; the
/// skip decision happens at commit, not here.
#[derive(Debug, Clone, Serialize)]
pub struct StatementRow {
    pub index: usize,
    pub date: String,
    pub description: String,
    pub amount: Decimal,
    pub exists: bool,
}

/// A row the admin selected for commit, carrying the literal preview values.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectedRow {
    pub date: String,
    pub description: String,
    pub amount: Decimal,
}

pub fn allowed_extension(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    ALLOWED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Parses an uploaded statement into candidate payment rows.
///
/// Column resolution failure is a hard error naming what is missing and what
/// was found; individual rows that cannot be parsed are dropped silently.
pub fn preview_statement(
    store: &dyn Store,
    bytes: &[u8],
    filename: &str,
    min_amount: Option<Decimal>,
) -> Result<Vec<StatementRow>> {
    if !allowed_extension(filename) {
        return Err(Error::Import(
            "only .xlsx and .xls files are accepted".to_string(),
        ));
    }

    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor)
        .map_err(|e| Error::Import(format!("could not read workbook: {e}")))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| Error::Import("workbook has no sheets".to_string()))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| Error::Import(format!("could not read sheet '{sheet_name}': {e}")))?;

    let mut rows = range.rows();
    let header_row = rows
        .next()
        .ok_or_else(|| Error::Import("sheet is empty".to_string()))?;
    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| cell.to_string().trim().to_string())
        .collect();

    let columns = resolve_columns(&headers)?;

    let mut out = Vec::new();
    for (i, row) in rows.enumerate() {
        // Rows missing any of the three resolved fields are dropped; a
        // non-numeric amount counts as missing.
        let Some(date) = row.get(columns.date).and_then(cell_date) else {
            continue;
        };
        let Some(description) = row.get(columns.description).and_then(cell_text) else {
            continue;
        };
        let Some(amount) = row.get(columns.amount).and_then(cell_amount) else {
            continue;
        };

        // Refunds and zero rows are excluded from import.
        if amount <= Decimal::ZERO {
            continue;
        }
        if let Some(min) = min_amount {
            if amount < min {
                continue;
            }
        }

        let exists = store.payment_exists(date, &description, amount)?;
        out.push(StatementRow {
            index: i,
            date: date.format(DISPLAY_DATE_FORMAT).to_string(),
            description,
            amount,
            exists,
        });
    }

    if out.is_empty() {
        return Err(Error::Import(
            "no payments matched the filter criteria".to_string(),
        ));
    }
    Ok(out)
}

/// Commits the admin's selection. Existence is re-checked per row at commit
/// time (the file may have been re-uploaded between preview and commit);
/// returns the count actually inserted.
pub fn commit_rows(store: &dyn Store, rows: &[SelectedRow], created_by: &str) -> Result<usize> {
    let mut payments = Vec::with_capacity(rows.len());
    for row in rows {
        let date = NaiveDate::parse_from_str(&row.date, DISPLAY_DATE_FORMAT)
            .map_err(|_| Error::BadRequest(format!("invalid date '{}'", row.date)))?;
        payments.push(Payment {
            id: Uuid::new_v4().to_string(),
            transaction_date: date,
            description: row.description.clone(),
            amount: row.amount.round_dp(2),
            reference_no: None,
            payment_type: None,
            student_id: None,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
            is_active: true,
        });
    }

    store.insert_payments(&payments)
}

#[derive(Debug)]
struct ResolvedColumns {
    date: usize,
    description: usize,
    amount: usize,
}

fn find_column(headers: &[String], variants: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| variants.iter().any(|v| h == v))
}

fn resolve_columns(headers: &[String]) -> Result<ResolvedColumns> {
    let date = find_column(headers, DATE_HEADERS);
    let description = find_column(headers, DESCRIPTION_HEADERS);
    let amount = find_column(headers, AMOUNT_HEADERS);

    if let (Some(date), Some(description), Some(amount)) = (date, description, amount) {
        return Ok(ResolvedColumns {
            date,
            description,
            amount,
        });
    }

    let mut missing = Vec::new();
    if date.is_none() {
        missing.push("date");
    }
    if description.is_none() {
        missing.push("description");
    }
    if amount.is_none() {
        missing.push("amount");
    }
    Err(Error::Import(format!(
        "could not resolve columns: missing {}; headers found: {}",
        missing.join(", "),
        headers.join(", ")
    )))
}

fn cell_date(cell: &Data) -> Option<NaiveDate> {
    match cell {
        Data::DateTime(dt) => dt.as_datetime().map(|ndt| ndt.date()),
        Data::DateTimeIso(s) => parse_date_string(s),
        Data::String(s) => parse_date_string(s),
        _ => None,
    }
}

fn parse_date_string(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let s = s.split_once('T').map_or(s, |(d, _)| d);
    for format in [DISPLAY_DATE_FORMAT, "%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }
    None
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        other => Some(other.to_string()),
    }
}

fn cell_amount(cell: &Data) -> Option<Decimal> {
    match cell {
        Data::Float(f) => Decimal::try_from(*f).ok().map(|d| d.round_dp(2)),
        Data::Int(i) => Some(Decimal::from(*i)),
        Data::String(s) => s
            .trim()
            .replace(',', ".")
            .parse::<Decimal>()
            .ok()
            .map(|d| d.round_dp(2)),
        _ => None,
    }
}
