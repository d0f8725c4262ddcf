pub mod session;
pub mod vocabulary;

pub use session::SessionDefaults;
pub use vocabulary::Vocabulary;

use std::fmt;

pub const SERIAL_COLUMN: &str = "serial_number";
pub const CONFIRMED_COLUMN: &str = "confirmed";
pub const STATUS_COLUMN: &str = "status";
pub const SCHOOL_COLUMN: &str = "school";

/// Literal written to the `confirmed` column when a record is confirmed.
pub const CONFIRMED_TRUE: &str = "True";

/// Trims surrounding whitespace and uppercases a serial number.
pub fn normalize_serial(input: &str) -> String {
    input.trim().to_uppercase()
}

/// `confirmed` cells are true only when they read `true`, ignoring case.
pub fn parse_confirmed(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgreementRecord {
    pub serial_number: String,
    pub confirmed: bool,
    pub status: Option<String>,
    pub school: Option<String>,
    /// Every other column, in file order, kept verbatim.
    pub passthrough: Vec<(String, String)>,
}

impl AgreementRecord {
    /// Builds a record from one CSV row. Returns `None` when the row has no
    /// usable serial number.
    pub fn from_row<'a, H, V>(headers: H, values: V) -> Option<Self>
    where
        H: IntoIterator<Item = &'a str>,
        V: IntoIterator<Item = &'a str>,
    {
        let mut serial_number = None;
        let mut confirmed = false;
        let mut status = None;
        let mut school = None;
        let mut passthrough = Vec::new();

        let mut values = values.into_iter();
        for header in headers {
            let value = values.next().unwrap_or("");
            match header {
                SERIAL_COLUMN => {
                    let trimmed = value.trim();
                    if !trimmed.is_empty() {
                        serial_number = Some(trimmed.to_string());
                    }
                }
                CONFIRMED_COLUMN => confirmed = parse_confirmed(value),
                STATUS_COLUMN => status = non_empty(value),
                SCHOOL_COLUMN => school = non_empty(value),
                other => passthrough.push((other.to_string(), value.to_string())),
            }
        }

        Some(Self {
            serial_number: serial_number?,
            confirmed,
            status,
            school,
            passthrough,
        })
    }

    /// Index key for this record.
    pub fn key(&self) -> String {
        normalize_serial(&self.serial_number)
    }

    pub fn confirm(&mut self, status: Option<&str>, school: Option<&str>) {
        self.confirmed = true;
        self.status = status.map(str::to_string);
        self.school = school.map(str::to_string);
    }

    pub fn field(&self, column: &str) -> Option<&str> {
        self.passthrough
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }
}

impl fmt::Display for AgreementRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (confirmed: {}, status: {}, school: {})",
            self.serial_number,
            self.confirmed,
            self.status.as_deref().unwrap_or("-"),
            self.school.as_deref().unwrap_or("-"),
        )
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADERS: [&str; 6] = [
        "student",
        SERIAL_COLUMN,
        CONFIRMED_COLUMN,
        STATUS_COLUMN,
        SCHOOL_COLUMN,
        "batch",
    ];

    #[test]
    fn normalizes_serials_to_trimmed_uppercase() {
        assert_eq!(normalize_serial("  dmpx12ab \n"), "DMPX12AB");
        assert_eq!(normalize_serial(""), "");
    }

    #[test]
    fn confirmed_accepts_any_case_of_true_only() {
        assert!(parse_confirmed("True"));
        assert!(parse_confirmed("true"));
        assert!(parse_confirmed(" TRUE "));
        assert!(!parse_confirmed("yes"));
        assert!(!parse_confirmed("1"));
        assert!(!parse_confirmed(""));
    }

    #[test]
    fn parses_row_and_keeps_passthrough_columns_in_order() {
        let record = AgreementRecord::from_row(
            HEADERS,
            ["Kari", "dmpx12ab", "False", "", "", "2024-A"],
        )
        .expect("record");

        assert_eq!(record.serial_number, "dmpx12ab");
        assert_eq!(record.key(), "DMPX12AB");
        assert!(!record.confirmed);
        assert_eq!(record.status, None);
        assert_eq!(record.school, None);
        assert_eq!(
            record.passthrough,
            vec![
                ("student".to_string(), "Kari".to_string()),
                ("batch".to_string(), "2024-A".to_string()),
            ]
        );
        assert_eq!(record.field("batch"), Some("2024-A"));
    }

    #[test]
    fn short_rows_read_missing_cells_as_empty() {
        let record =
            AgreementRecord::from_row(HEADERS, ["Ola", "SN1", "true"]).expect("record");
        assert!(record.confirmed);
        assert_eq!(record.field("batch"), Some(""));
    }

    #[test]
    fn rows_without_serial_are_rejected() {
        assert!(AgreementRecord::from_row(HEADERS, ["Ola", "  ", "true"]).is_none());
        assert!(AgreementRecord::from_row(["name"], ["Ola"]).is_none());
    }

    #[test]
    fn confirm_sets_flag_and_selection() {
        let mut record =
            AgreementRecord::from_row(HEADERS, ["Kari", "SN1", "", "", "", ""]).expect("record");
        record.confirm(Some("Sprekk"), Some("Breilia skole"));
        assert!(record.confirmed);
        assert_eq!(record.status.as_deref(), Some("Sprekk"));
        assert_eq!(record.school.as_deref(), Some("Breilia skole"));
    }
}
