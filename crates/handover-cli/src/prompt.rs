use crate::operator::Operator;
use handover_core::{normalize_serial, SessionDefaults, Vocabulary};

pub const REUPDATE_PROMPT: &str =
    "Device already confirmed. Do you want to update it again? (yes/no) [default: no]: ";
pub const MANUAL_SERIAL_PROMPT: &str = "Enter the serial number: ";

/// Asks whether an already confirmed device should be updated again.
/// Empty input, "no" and closed input all mean no.
pub fn confirm_reupdate<O: Operator + ?Sized>(operator: &mut O) -> bool {
    loop {
        let Some(answer) = operator.ask(REUPDATE_PROMPT) else {
            return false;
        };
        match answer.trim().to_lowercase().as_str() {
            "yes" => return true,
            "no" | "" => return false,
            _ => operator.say("Please enter 'yes' or 'no'."),
        }
    }
}

pub fn choose_status<O: Operator + ?Sized>(
    operator: &mut O,
    statuses: &Vocabulary,
    defaults: &mut SessionDefaults,
) -> Option<String> {
    let answer = show_menu(operator, "status", statuses, defaults.status.as_deref());
    defaults
        .choose_status(statuses, &answer)
        .map(str::to_string)
}

pub fn choose_school<O: Operator + ?Sized>(
    operator: &mut O,
    schools: &Vocabulary,
    defaults: &mut SessionDefaults,
) -> Option<String> {
    let answer = show_menu(operator, "school", schools, defaults.school.as_deref());
    defaults
        .choose_school(schools, &answer)
        .map(str::to_string)
}

/// Operator-typed serial number, normalized. No other validation.
pub fn manual_serial<O: Operator + ?Sized>(operator: &mut O) -> Option<String> {
    operator
        .ask(MANUAL_SERIAL_PROMPT)
        .map(|answer| normalize_serial(&answer))
}

fn show_menu<O: Operator + ?Sized>(
    operator: &mut O,
    noun: &str,
    vocabulary: &Vocabulary,
    current: Option<&str>,
) -> String {
    operator.say(&format!("Select {noun}:"));
    for (key, label) in vocabulary.entries() {
        operator.say(&format!("{key}: {label}"));
    }
    let current = current.unwrap_or("None");
    operator
        .ask(&format!("Enter {noun} number [Current: {current}]: "))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::testing::ScriptedOperator;

    #[test]
    fn reupdate_defaults_to_no() {
        let mut operator = ScriptedOperator::with_answers([""]);
        assert!(!confirm_reupdate(&mut operator));

        let mut operator = ScriptedOperator::with_answers(["No"]);
        assert!(!confirm_reupdate(&mut operator));

        let mut operator = ScriptedOperator::default();
        assert!(!confirm_reupdate(&mut operator));
    }

    #[test]
    fn reupdate_reasks_until_answer_is_understood() {
        let mut operator = ScriptedOperator::with_answers(["y", "maybe", " YES "]);
        assert!(confirm_reupdate(&mut operator));
        assert_eq!(operator.asked("update it again"), 3);
        assert_eq!(
            operator
                .transcript
                .iter()
                .filter(|line| line.as_str() == "Please enter 'yes' or 'no'.")
                .count(),
            2
        );
    }

    #[test]
    fn status_menu_lists_options_and_current_value() {
        let statuses = Vocabulary::statuses();
        let mut defaults = SessionDefaults {
            status: Some("Knust".to_string()),
            school: None,
        };
        let mut operator = ScriptedOperator::with_answers(["2"]);

        let chosen = choose_status(&mut operator, &statuses, &mut defaults);
        assert_eq!(chosen.as_deref(), Some("Sprekk"));
        assert!(operator.said("Select status:"));
        assert!(operator.said("4: Knust"));
        assert_eq!(operator.asked("[Current: Knust]"), 1);
        assert_eq!(defaults.status.as_deref(), Some("Sprekk"));
    }

    #[test]
    fn invalid_school_answer_keeps_sticky_value() {
        let schools = Vocabulary::schools();
        let mut defaults = SessionDefaults {
            status: None,
            school: Some("Baksalen skole".to_string()),
        };
        let mut operator = ScriptedOperator::with_answers(["42"]);

        let chosen = choose_school(&mut operator, &schools, &mut defaults);
        assert_eq!(chosen.as_deref(), Some("Baksalen skole"));
    }

    #[test]
    fn first_prompt_shows_none_as_current() {
        let schools = Vocabulary::schools();
        let mut defaults = SessionDefaults::default();
        let mut operator = ScriptedOperator::default();

        assert_eq!(choose_school(&mut operator, &schools, &mut defaults), None);
        assert_eq!(operator.asked("Enter school number [Current: None]: "), 1);
    }

    #[test]
    fn manual_serial_is_trimmed_and_uppercased() {
        let mut operator = ScriptedOperator::with_answers(["  dmpx12ab "]);
        assert_eq!(manual_serial(&mut operator).as_deref(), Some("DMPX12AB"));

        let mut closed = ScriptedOperator::default();
        assert_eq!(manual_serial(&mut closed), None);
    }
}
