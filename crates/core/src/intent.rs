pub const RESERVED_COMMANDS: &[&str] = &["exit", "e", "quit"];

pub fn normalize_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn is_reserved_command(text: &str) -> bool {
    let trimmed = text.trim();
    RESERVED_COMMANDS
        .iter()
        .any(|command| trimmed.eq_ignore_ascii_case(command))
}

/// Human-readable form of an intent id, e.g. `fraud_analysis` -> `Fraud Analysis`.
pub fn display_name(intent_id: &str) -> String {
    intent_id
        .split(|ch: char| ch == '_' || ch == '-' || ch.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize_text("  show \t all\n data  "), "show all data");
    }

    #[test]
    fn recognizes_reserved_commands() {
        assert!(is_reserved_command(" EXIT "));
        assert!(is_reserved_command("e"));
        assert!(is_reserved_command("Quit"));
        assert!(!is_reserved_command("exit now"));
    }

    #[test]
    fn titles_intent_ids() {
        assert_eq!(display_name("fraud_analysis"), "Fraud Analysis");
        assert_eq!(display_name("category_volume"), "Category Volume");
        assert_eq!(display_name("ALL_DATA"), "All Data");
    }
}
