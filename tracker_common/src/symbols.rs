//! Symbol normalisation and watch-list parsing shared between client and server.
//!
//! Symbols are kept as upper-case strings. A valid symbol is 1 to 10
//! characters drawn from `A-Z`, `0-9`, `.` and `-` (e.g. `BRK.B`, `RDS-A`).

use std::collections::HashSet;
use std::io::BufRead;

use crate::error::TrackerError;

/// Longest symbol accepted.
pub const MAX_SYMBOL_LEN: usize = 10;

/// Trim and upper-case `raw`, rejecting anything that is not a valid symbol.
pub fn normalize_symbol(raw: &str) -> Result<String, TrackerError> {
    let symbol = raw.trim().to_ascii_uppercase();
    if is_valid_symbol(&symbol) {
        Ok(symbol)
    } else {
        Err(TrackerError::InvalidSymbol(raw.trim().to_string()))
    }
}

/// Check an already normalised symbol.
pub fn is_valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol.len() <= MAX_SYMBOL_LEN
        && symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-')
}

/// Split a comma/whitespace separated list, normalise each entry and drop
/// duplicates while keeping first-seen order.
pub fn parse_symbol_list(input: &str) -> Result<Vec<String>, TrackerError> {
    let mut seen = HashSet::new();
    let mut symbols = Vec::new();
    for token in input.split(|c: char| c == ',' || c.is_whitespace()) {
        if token.trim().is_empty() {
            continue;
        }
        let symbol = normalize_symbol(token)?;
        if seen.insert(symbol.clone()) {
            symbols.push(symbol);
        }
    }
    Ok(symbols)
}

/// Parse a watch-list file. Everything after `#` on a line is a comment.
pub fn parse_symbols<R: BufRead>(reader: R) -> Result<Vec<String>, TrackerError> {
    let mut content = String::new();
    for line_result in reader.lines() {
        let line = line_result?;
        let data = line.split('#').next().unwrap_or_default();
        content.push_str(data);
        content.push('\n');
    }
    parse_symbol_list(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_symbol("  aapl ").unwrap(), "AAPL");
        assert_eq!(normalize_symbol("brk.b").unwrap(), "BRK.B");
    }

    #[test]
    fn rejects_malformed_symbols() {
        assert!(normalize_symbol("").is_err());
        assert!(normalize_symbol("TOOLONGSYMBOL").is_err());
        assert!(normalize_symbol("AA PL").is_err());
        assert!(normalize_symbol("$AAPL").is_err());
    }

    #[test]
    fn list_is_deduplicated_in_first_seen_order() {
        let symbols = parse_symbol_list("msft, AAPL,msft  tsla").unwrap();
        assert_eq!(symbols, vec!["MSFT", "AAPL", "TSLA"]);
    }

    #[test]
    fn watch_list_file_skips_comments_and_blank_lines() {
        let input = "# core names\naapl, msft\n\n tsla # EV\n";
        let symbols = parse_symbols(Cursor::new(input)).unwrap();
        assert_eq!(symbols, vec!["AAPL", "MSFT", "TSLA"]);
    }

    #[test]
    fn watch_list_file_reports_bad_entry() {
        let err = parse_symbols(Cursor::new("AAPL\nnot/valid\n")).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidSymbol(s) if s == "not/valid"));
    }
}
