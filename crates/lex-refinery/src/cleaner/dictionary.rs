//! Built-in correction dictionary.
//!
//! Two tables:
//! - misspellings, substituted as whole words inside free text
//! - label-case variants, substituted when they make up an entire cell

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;

/// Common English misspellings and their corrections (lowercase).
const MISSPELLINGS: &[(&str, &str)] = &[
    ("teh", "the"),
    ("adn", "and"),
    ("recieve", "receive"),
    ("recieved", "received"),
    ("adress", "address"),
    ("occured", "occurred"),
    ("occurence", "occurrence"),
    ("seperate", "separate"),
    ("definately", "definitely"),
    ("untill", "until"),
    ("wich", "which"),
    ("becuase", "because"),
    ("accomodate", "accommodate"),
    ("acheive", "achieve"),
    ("beleive", "believe"),
    ("calender", "calendar"),
    ("enviroment", "environment"),
    ("goverment", "government"),
    ("independant", "independent"),
    ("reccomend", "recommend"),
    ("tommorow", "tomorrow"),
    ("wierd", "weird"),
    ("thier", "their"),
    ("neccessary", "necessary"),
    ("publically", "publicly"),
    ("sucessful", "successful"),
    ("succesful", "successful"),
    ("existance", "existence"),
    ("begining", "beginning"),
    ("buisness", "business"),
    ("comming", "coming"),
    ("dissapoint", "disappoint"),
    ("experiance", "experience"),
    ("foward", "forward"),
    ("freind", "friend"),
    ("grammer", "grammar"),
    ("happend", "happened"),
    ("immediatly", "immediately"),
    ("knowlege", "knowledge"),
    ("managment", "management"),
    ("noticable", "noticeable"),
    ("occassion", "occasion"),
    ("posession", "possession"),
    ("prefered", "preferred"),
    ("realy", "really"),
    ("relevent", "relevant"),
    ("responsability", "responsibility"),
    ("truely", "truly"),
    ("useing", "using"),
    ("writting", "writing"),
    ("yeild", "yield"),
];

/// Label variants mapped to their canonical casing (keys lowercase).
const LABEL_CASE: &[(&str, &str)] = &[
    ("male", "Male"),
    ("female", "Female"),
    ("yes", "Yes"),
    ("no", "No"),
];

static MISSPELLING_MAP: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| MISSPELLINGS.iter().copied().collect());

static LABEL_CASE_MAP: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| LABEL_CASE.iter().copied().collect());

static MISSPELLING_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let alternatives: Vec<&str> = MISSPELLINGS.iter().map(|(wrong, _)| *wrong).collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|")))
        .expect("Invalid regex: misspellings")
});

/// Replace known misspellings, keeping the casing of the original word.
///
/// `Teh` becomes `The`, `TEH` becomes `THE`.
pub fn fix_misspellings(text: &str) -> String {
    MISSPELLING_PATTERN
        .replace_all(text, |caps: &Captures| {
            let word = &caps[0];
            match MISSPELLING_MAP.get(word.to_lowercase().as_str()) {
                Some(fixed) => match_case(word, fixed),
                None => word.to_string(),
            }
        })
        .into_owned()
}

/// Canonical casing for a cell that is entirely a known label variant.
///
/// Surrounding whitespace is ignored; anything else returns `None`.
pub fn canonical_label(value: &str) -> Option<&'static str> {
    LABEL_CASE_MAP.get(value.trim().to_lowercase().as_str()).copied()
}

fn match_case(original: &str, replacement: &str) -> String {
    let letters: Vec<char> = original.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        return replacement.to_uppercase();
    }
    if original.chars().next().is_some_and(char::is_uppercase) {
        let mut chars = replacement.chars();
        return match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
    }
    replacement.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_misspellings_whole_word_only() {
        assert_eq!(fix_misspellings("teh cat"), "the cat");
        assert_eq!(fix_misspellings("I recieve mail"), "I receive mail");
        // Embedded in a longer word: untouched
        assert_eq!(fix_misspellings("tehran"), "tehran");
    }

    #[test]
    fn test_fix_misspellings_preserves_case() {
        assert_eq!(fix_misspellings("Teh end"), "The end");
        assert_eq!(fix_misspellings("TEH END"), "THE END");
    }

    #[test]
    fn test_canonical_label() {
        assert_eq!(canonical_label("MALE"), Some("Male"));
        assert_eq!(canonical_label(" female "), Some("Female"));
        assert_eq!(canonical_label("Yes"), Some("Yes"));
        assert_eq!(canonical_label("males"), None);
        assert_eq!(canonical_label("no way"), None);
    }
}
