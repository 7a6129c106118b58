// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::OnceLock;

use regex::Regex;

/// Split a contact name into first and last name.
///
/// A single word is used for both parts.
pub fn parse_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.split_whitespace();
    match parts.next() {
        None => (String::new(), String::new()),
        Some(first) => {
            let rest: Vec<&str> = parts.collect();
            if rest.is_empty() {
                (first.to_owned(), first.to_owned())
            } else {
                (first.to_owned(), rest.join(" "))
            }
        }
    }
}

/// Split a US zipcode into the 5 digit code and the 4 digit extension.
///
/// Anything that is not 5 or 9 digits yields two empty strings.
pub fn parse_zipcode(zipcode: &str) -> (String, String) {
    let digits: String = zipcode.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        5 => (digits, String::new()),
        9 => (digits[..5].to_owned(), digits[5..].to_owned()),
        _ => (String::new(), String::new()),
    }
}

pub fn is_valid_zipcode(zipcode: &str) -> bool {
    static ZIP: OnceLock<Option<Regex>> = OnceLock::new();
    ZIP.get_or_init(|| Regex::new(r"^\d{5}(-\d{4})?$").ok())
        .as_ref()
        .map(|re| re.is_match(zipcode))
        .unwrap_or(false)
}

/// Three lowercase letters, e.g. `usd`.
pub fn is_valid_currency(currency: &str) -> bool {
    static CURRENCY: OnceLock<Option<Regex>> = OnceLock::new();
    CURRENCY
        .get_or_init(|| Regex::new(r"^[a-z]{3}$").ok())
        .as_ref()
        .map(|re| re.is_match(currency))
        .unwrap_or(false)
}

/// Check a 12 digit UPC-A code including its check digit.
pub fn is_valid_upc(upc: &str) -> bool {
    if upc.len() != 12 || !upc.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let digits: Vec<u32> = upc.chars().filter_map(|c| c.to_digit(10)).collect();
    let odd: u32 = digits[..11].iter().step_by(2).sum();
    let even: u32 = digits[1..11].iter().step_by(2).sum();
    let check = (10 - (odd * 3 + even) % 10) % 10;
    check == digits[11]
}
