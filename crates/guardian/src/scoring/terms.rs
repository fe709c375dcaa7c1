//! Keyword lists used by the text scorer and severity computation.
//!
//! All terms are lowercase; matching is a case-insensitive substring check.
//! The lists are disjoint so that a matched term belongs to exactly one
//! category.

/// Violence and self-harm.
pub const VIOLENCE_TERMS: &[&str] = &[
    "zabiję",
    "zabić",
    "pobić",
    "nóż",
    "pistolet",
    "samobójstwo",
    "zabij się",
    "potnę się",
    "powieszę się",
    "krew",
];

/// Insults, humiliation, and exclusion.
pub const CYBERBULLYING_TERMS: &[&str] = &[
    "frajer",
    "debil",
    "idiota",
    "brzydal",
    "grubas",
    "nikt cię nie lubi",
    "wszyscy cię nienawidzą",
    "ośmieszę cię",
    "nienawidzę cię",
    "zgiń",
    "przegryw",
];

/// Grooming patterns and substance references.
pub const GROOMING_SUBSTANCE_TERMS: &[&str] = &[
    "spotkajmy się",
    "tajemnica",
    "nie mów rodzicom",
    "wyślij zdjęcie",
    "narkotyki",
    "dopalacze",
    "marihuana",
    "alkohol",
    "tabletki",
    "ile masz lat",
    "jesteś sama",
    "kamerka",
];

/// Applications commonly used to reach minors outside supervised channels.
pub const RISKY_APP_TERMS: &[&str] = &[
    "tinder",
    "omegle",
    "chatroulette",
    "wickr",
    "badoo",
    "onlyfans",
    "yubo",
    "monkey app",
];

/// First half of the compound grooming context rule.
pub const MEETING_TERMS: &[&str] = &[
    "spotkajmy",
    "spotkanie",
    "przyjdź do mnie",
    "przyjedź",
    "umówmy się",
];

/// Second half of the compound grooming context rule.
pub const SECRECY_TERMS: &[&str] = &[
    "tajemnica",
    "sekret",
    "nie mów nikomu",
    "nie mów rodzicom",
    "usuń wiadomość",
];

/// Synthetic match recorded when meeting and secrecy terms co-occur.
pub const CONTEXT_MATCH: &str = "suspicious context";

/// Synthetic match recorded for a phone-number-shaped digit run.
pub const PHONE_MATCH: &str = "phone number";

/// Synthetic match recorded for an email-shaped token.
pub const EMAIL_MATCH: &str = "email address";

/// Terms that add 0.4 to the severity weight.
pub const HIGH_RISK_TERMS: &[&str] = &[
    "samobójstwo",
    "zabij się",
    "potnę się",
    "powieszę się",
    "zabiję",
    "pistolet",
    "narkotyki",
    "dopalacze",
    "nie mów rodzicom",
    "wyślij zdjęcie",
    "spotkajmy się",
    CONTEXT_MATCH,
];

/// Terms that add 0.2 to the severity weight.
pub const MEDIUM_RISK_TERMS: &[&str] = &[
    "zabić",
    "pobić",
    "nóż",
    "krew",
    "tajemnica",
    "marihuana",
    "alkohol",
    "tabletki",
    "ile masz lat",
    "jesteś sama",
    "nienawidzę cię",
    "wszyscy cię nienawidzą",
    "zgiń",
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_threat_lists_are_disjoint() {
        let mut seen = HashSet::new();
        for term in VIOLENCE_TERMS
            .iter()
            .chain(CYBERBULLYING_TERMS)
            .chain(GROOMING_SUBSTANCE_TERMS)
            .chain(RISKY_APP_TERMS)
        {
            assert!(seen.insert(*term), "duplicate term: {term}");
        }
    }

    #[test]
    fn test_terms_are_lowercase() {
        for term in VIOLENCE_TERMS
            .iter()
            .chain(CYBERBULLYING_TERMS)
            .chain(GROOMING_SUBSTANCE_TERMS)
            .chain(RISKY_APP_TERMS)
            .chain(MEETING_TERMS)
            .chain(SECRECY_TERMS)
        {
            assert_eq!(*term, term.to_lowercase());
        }
    }

    #[test]
    fn test_severity_lists_do_not_overlap() {
        for term in HIGH_RISK_TERMS {
            assert!(!MEDIUM_RISK_TERMS.contains(term), "{term} in both lists");
        }
    }
}
