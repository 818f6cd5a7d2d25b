//! MT950-style statement parser.
//!
//! Line oriented. A field line starts with `:TAG:`; lines without a tag
//! continue the current field, which only matters for `:86:`. The parser
//! fails fast: the first malformed field rejects the whole message.

use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use ledger_shared::types::CurrencyCode;
use rust_decimal::Decimal;
use tracing::debug;

use super::error::{FieldError, StatementError};
use super::statement::{Direction, EntryMark, StatementBalance, StatementEntry, StatementMessage};

const BALANCE_MIN_LEN: usize = 14;
const ENTRY_MIN_LEN: usize = 16;
const TRANSACTION_TYPE_LEN: usize = 4;

/// Parses a statement message.
///
/// # Errors
///
/// [`StatementError::Empty`] for blank input, [`StatementError::Field`] for
/// the first malformed field, [`StatementError::MissingField`] when `:20:`
/// or `:25:` is absent.
pub fn parse_mt950(raw: &str) -> Result<StatementMessage, StatementError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StatementError::Empty);
    }

    let mut reference = None;
    let mut account = None;
    let mut statement_number = None;
    let mut opening_balance = None;
    let mut closing_balance = None;
    let mut entries = Vec::new();
    let mut open_entry: Option<StatementEntry> = None;
    let mut current_tag: Option<&str> = None;

    for line in raw.lines() {
        let line = line.trim_end_matches('\r');

        let Some((tag, value)) = split_tag(line) else {
            if current_tag == Some("86") {
                if let Some(entry) = open_entry.as_mut() {
                    append_details(&mut entry.supplementary_details, line);
                }
            }
            continue;
        };

        match tag {
            "20" => reference = non_empty(value),
            "25" => account = non_empty(value),
            "28C" => statement_number = non_empty(value),
            "60F" => {
                opening_balance =
                    Some(parse_balance(value).map_err(StatementError::field("60F"))?);
            }
            "61" => {
                entries.extend(open_entry.take());
                open_entry = Some(parse_entry(value).map_err(StatementError::field("61"))?);
            }
            "86" => {
                if let Some(entry) = open_entry.as_mut() {
                    entry.supplementary_details = value.trim().to_string();
                }
            }
            "62F" => {
                entries.extend(open_entry.take());
                closing_balance =
                    Some(parse_balance(value).map_err(StatementError::field("62F"))?);
            }
            other => debug!(tag = other, "ignoring statement field"),
        }
        current_tag = Some(tag);
    }
    entries.extend(open_entry);

    let reference = reference.ok_or(StatementError::MissingField { tag: "20" })?;
    let account = account.ok_or(StatementError::MissingField { tag: "25" })?;

    Ok(StatementMessage {
        reference,
        account,
        statement_number,
        opening_balance,
        entries,
        closing_balance,
    })
}

/// Splits `:TAG:value` into `(TAG, value)`.
fn split_tag(line: &str) -> Option<(&str, &str)> {
    if line.len() <= 3 {
        return None;
    }
    let rest = line.strip_prefix(':')?;
    let end = rest.find(':')?;
    if end == 0 {
        return None;
    }
    Some((&rest[..end], &rest[end + 1..]))
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn append_details(details: &mut String, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    if !details.is_empty() {
        details.push(' ');
    }
    details.push_str(line);
}

/// `[D|C]YYMMDDCCCamount`, e.g. `C230115USD1000,00`.
fn parse_balance(s: &str) -> Result<StatementBalance, FieldError> {
    if s.len() < BALANCE_MIN_LEN {
        return Err(FieldError::TooShort {
            min: BALANCE_MIN_LEN,
            len: s.len(),
        });
    }

    let mark = s.get(..1).unwrap_or(s);
    let direction =
        Direction::from_code(mark).ok_or_else(|| FieldError::BadDirection(mark.to_string()))?;
    let date = parse_date(s.get(1..7).unwrap_or_default())?;
    let currency_code = s.get(7..10).unwrap_or_default();
    let currency = CurrencyCode::new(currency_code)
        .map_err(|_| FieldError::BadCurrency(currency_code.to_string()))?;
    let amount = parse_amount(s.get(10..).unwrap_or_default())?;

    Ok(StatementBalance {
        direction,
        date,
        currency,
        amount,
    })
}

/// `YYMMDD[MMDD](D|C|RC|RD)amountTTTTreference`, e.g. `230115C500,00NTRFREF2`.
fn parse_entry(s: &str) -> Result<StatementEntry, FieldError> {
    if s.len() < ENTRY_MIN_LEN {
        return Err(FieldError::TooShort {
            min: ENTRY_MIN_LEN,
            len: s.len(),
        });
    }

    let value_date = parse_date(s.get(..6).unwrap_or_default())?;
    let mut pos = 6;

    let mut entry_date = value_date;
    if let Some(date) = s.get(6..10).and_then(|mmdd| entry_date_override(value_date, mmdd)) {
        entry_date = date;
        pos = 10;
    }

    let (mark, mark_len) = parse_mark(s.get(pos..).unwrap_or_default())?;
    pos += mark_len;

    let rest = s.get(pos..).unwrap_or_default();
    let amount_len = rest
        .bytes()
        .take_while(|b| b.is_ascii_digit() || *b == b',' || *b == b'.')
        .count();
    let amount = parse_amount(&rest[..amount_len])?;

    let rest = &rest[amount_len..];
    let transaction_type = rest
        .get(..TRANSACTION_TYPE_LEN)
        .ok_or_else(|| FieldError::BadTransactionType(rest.to_string()))?;
    let reference = rest.get(TRANSACTION_TYPE_LEN..).unwrap_or_default().trim();

    Ok(StatementEntry {
        value_date,
        entry_date,
        mark,
        amount,
        transaction_type: transaction_type.to_string(),
        reference: reference.to_string(),
        supplementary_details: String::new(),
    })
}

/// `MMDD` booking date in the value date's year, if it looks like one.
fn entry_date_override(value_date: NaiveDate, mmdd: &str) -> Option<NaiveDate> {
    if !mmdd.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let month: u32 = mmdd.get(..2)?.parse().ok()?;
    let day: u32 = mmdd.get(2..)?.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    NaiveDate::from_ymd_opt(value_date.year(), month, day)
}

fn parse_mark(s: &str) -> Result<(EntryMark, usize), FieldError> {
    match s.get(..1) {
        Some("D") => Ok((EntryMark::Debit, 1)),
        Some("C") => Ok((EntryMark::Credit, 1)),
        Some("R") => match s.get(..2) {
            Some("RC") => Ok((EntryMark::ReversalCredit, 2)),
            Some("RD") => Ok((EntryMark::ReversalDebit, 2)),
            other => Err(FieldError::BadDirection(other.unwrap_or("R").to_string())),
        },
        other => Err(FieldError::BadDirection(other.unwrap_or_default().to_string())),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, FieldError> {
    if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FieldError::BadDate(s.to_string()));
    }
    NaiveDate::parse_from_str(s, "%y%m%d").map_err(|_| FieldError::BadDate(s.to_string()))
}

/// Statement amounts use `,` as the decimal separator and may end with it.
fn parse_amount(s: &str) -> Result<Decimal, FieldError> {
    let normalized = s.trim().replace(',', ".");
    let normalized = normalized.strip_suffix('.').unwrap_or(&normalized);
    let valid = !normalized.is_empty()
        && normalized.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && normalized.bytes().filter(|b| *b == b'.').count() <= 1;
    if !valid {
        return Err(FieldError::BadAmount(s.to_string()));
    }
    Decimal::from_str(normalized).map_err(|_| FieldError::BadAmount(s.to_string()))
}
