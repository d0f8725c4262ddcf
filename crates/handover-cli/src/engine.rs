use crate::operator::Operator;
use crate::prompt;
use handover_core::{normalize_serial, SessionDefaults, Vocabulary};
use handover_storage::AgreementStore;
use std::fmt;
use tracing::{error, info};

/// Menus offered during confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Menus {
    pub statuses: Vocabulary,
    pub schools: Vocabulary,
}

impl Default for Menus {
    fn default() -> Self {
        Self {
            statuses: Vocabulary::statuses(),
            schools: Vocabulary::schools(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// No serial number could be obtained.
    Unresolved,
    NotFound {
        serial: String,
    },
    /// Already confirmed and the operator chose not to update again.
    Kept {
        serial: String,
    },
    Updated {
        serial: String,
        status: Option<String>,
        school: Option<String>,
    },
    PersistFailed {
        serial: String,
        error: String,
    },
}

impl fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchOutcome::Unresolved => f.write_str("unresolved"),
            MatchOutcome::NotFound { serial } => write!(f, "{serial}: no agreement"),
            MatchOutcome::Kept { serial } => write!(f, "{serial}: kept existing confirmation"),
            MatchOutcome::Updated {
                serial,
                status,
                school,
            } => write!(
                f,
                "{serial}: confirmed ({}, {})",
                status.as_deref().unwrap_or("-"),
                school.as_deref().unwrap_or("-")
            ),
            MatchOutcome::PersistFailed { serial, error } => {
                write!(f, "{serial}: update failed ({error})")
            }
        }
    }
}

/// Matches resolved serial numbers against the store and runs the
/// confirmation dialogue. Holds the sticky selections for the session.
pub struct MatchEngine {
    menus: Menus,
    defaults: SessionDefaults,
}

impl MatchEngine {
    pub fn new(menus: Menus) -> Self {
        Self {
            menus,
            defaults: SessionDefaults::default(),
        }
    }

    #[cfg(test)]
    pub fn defaults(&self) -> &SessionDefaults {
        &self.defaults
    }

    pub fn process<O: Operator + ?Sized>(
        &mut self,
        store: &mut AgreementStore,
        operator: &mut O,
        serial: Option<&str>,
    ) -> MatchOutcome {
        let Some(serial) = serial
            .map(normalize_serial)
            .filter(|serial| !serial.is_empty())
        else {
            operator.say("Could not retrieve serial number.");
            info!(event = "serial_unresolved");
            return MatchOutcome::Unresolved;
        };

        operator.copy_to_clipboard(&serial);
        operator.say(&format!("Found matching iPad with serial number: {serial}"));

        let already_confirmed = match store.get(&serial) {
            Some(entry) => entry.record.confirmed,
            None => {
                operator.say(&format!(
                    "No agreement found for iPad with serial number: {serial}"
                ));
                info!(event = "agreement_missing", serial = %serial);
                return MatchOutcome::NotFound { serial };
            }
        };

        if already_confirmed && !prompt::confirm_reupdate(operator) {
            info!(event = "reupdate_declined", serial = %serial);
            return MatchOutcome::Kept { serial };
        }

        let status = prompt::choose_status(operator, &self.menus.statuses, &mut self.defaults);
        let school = prompt::choose_school(operator, &self.menus.schools, &mut self.defaults);

        match store.confirm(&serial, status.as_deref(), school.as_deref()) {
            Ok(_) => {
                operator.say(&format!(
                    "Updated CSV for iPad with serial number: {serial}"
                ));
                operator.say(&format!(
                    "Confirmed devices: {}/{}",
                    store.confirmed_count(),
                    store.len()
                ));
                info!(
                    event = "agreement_confirmed",
                    serial = %serial,
                    status = status.as_deref().unwrap_or(""),
                    school = school.as_deref().unwrap_or("")
                );
                MatchOutcome::Updated {
                    serial,
                    status,
                    school,
                }
            }
            Err(err) => {
                operator.say(&format!(
                    "Failed to update agreement for {serial}: {err}"
                ));
                error!(event = "agreement_persist_failed", serial = %serial, error = %err);
                MatchOutcome::PersistFailed {
                    serial,
                    error: err.to_string(),
                }
            }
        }
    }
}
