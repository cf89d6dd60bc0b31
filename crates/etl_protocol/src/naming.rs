//! Header normalization shared by every row source and the transform layer.

/// Lowercase, trim, and collapse non-alphanumeric runs to a single underscore.
///
/// This is the single normalization boundary between whatever a source calls
/// a field (`"Ordre Nr."`, `"kundeNr"`, `" Dato "`) and the header keys that
/// the transform layer matches against live table columns.
pub fn normalize_header(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len());
    let mut last_was_sep = false;

    for ch in trimmed.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if ch.is_alphanumeric() {
            // non-ASCII letters/digits: keep as lowercase, not a separator
            out.extend(ch.to_lowercase());
            last_was_sep = false;
        } else {
            if !last_was_sep && !out.is_empty() {
                out.push('_');
                last_was_sep = true;
            }
        }
    }

    while out.ends_with('_') {
        out.pop();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_trims() {
        assert_eq!(normalize_header("  Ordrenr  "), "ordrenr");
    }

    #[test]
    fn collapses_runs() {
        assert_eq!(normalize_header("Ordre Nr."), "ordre_nr");
        assert_eq!(normalize_header("kunde--nr!!"), "kunde_nr");
    }

    #[test]
    fn drops_trailing_separators() {
        assert_eq!(normalize_header("total ($)"), "total");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(normalize_header(""), "");
        assert_eq!(normalize_header("   "), "");
    }

    #[test]
    fn idempotent() {
        let once = normalize_header("Kunde Nr. (intern)");
        let twice = normalize_header(&once);
        assert_eq!(once, twice);
    }
}
