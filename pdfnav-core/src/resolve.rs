use crate::files::File;

const PDF_SUFFIX: &str = ".pdf";

/// Canonical form used to match labels echoed by result producers against
/// uploaded file names: no `.pdf` suffix, runs of whitespace, `_` and `-`
/// collapsed to one space, lower case, trimmed.
pub fn normalize_label(label: &str) -> String {
    // The extension is stripped before trimming, so "a.pdf " keeps its suffix.
    let stem = match label.len().checked_sub(PDF_SUFFIX.len()) {
        Some(split)
            if label.is_char_boundary(split) && label[split..].eq_ignore_ascii_case(PDF_SUFFIX) =>
        {
            &label[..split]
        }
        _ => label,
    };
    let stem = stem.trim();

    let mut normalized = String::with_capacity(stem.len());
    let mut pending_separator = false;
    for ch in stem.chars() {
        if ch.is_whitespace() || ch == '_' || ch == '-' {
            pending_separator = true;
            continue;
        }
        if pending_separator && !normalized.is_empty() {
            normalized.push(' ');
        }
        pending_separator = false;
        normalized.extend(ch.to_lowercase());
    }
    normalized
}

/// Finds the single file whose normalized name equals the normalized label.
/// Zero or several candidates both resolve to `None`.
pub fn resolve<'a>(label: &str, files: &'a [File]) -> Option<&'a File> {
    let wanted = normalize_label(label);
    if wanted.is_empty() {
        return None;
    }
    let mut candidates = files
        .iter()
        .filter(|file| normalize_label(file.name()) == wanted);
    let first = candidates.next()?;
    match candidates.next() {
        Some(_) => None,
        None => Some(first),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(names: &[&str]) -> Vec<File> {
        names.iter().map(|name| File::new(*name, Vec::<u8>::new())).collect()
    }

    fn resolved_name(label: &str, files: &[File]) -> Option<String> {
        resolve(label, files).map(|file| file.name().to_owned())
    }

    #[test]
    fn normalization_strips_extension_and_separators() {
        assert_eq!(normalize_label("Trip_Guide.pdf"), "trip guide");
        assert_eq!(normalize_label("  South--of_France  -  Cities.PDF"), "south of france cities");
        assert_eq!(normalize_label("Guide.pdf "), "guide.pdf");
        assert_eq!(normalize_label("_leading and trailing_"), "leading and trailing");
        assert_eq!(normalize_label("report.pdf.pdf"), "report.pdf");
        assert_eq!(normalize_label(".pdf"), "");
    }

    #[test]
    fn underscore_label_matches_spaced_name() {
        let held = files(&["trip guide"]);
        assert_eq!(resolved_name("Trip_Guide.pdf", &held).as_deref(), Some("trip guide"));
    }

    #[test]
    fn only_exact_normalized_match_is_returned() {
        let held = files(&["trip-guide.pdf", "Trip Guide Extra.pdf"]);
        assert_eq!(resolved_name("Trip Guide", &held).as_deref(), Some("trip-guide.pdf"));
    }

    #[test]
    fn ambiguous_match_is_not_found() {
        let held = files(&["guide.pdf", "Guide.pdf"]);
        assert_eq!(resolved_name("guide", &held), None);
    }

    #[test]
    fn missing_and_empty_labels_are_not_found() {
        let held = files(&["invoice.pdf"]);
        assert_eq!(resolved_name("receipt", &held), None);
        assert_eq!(resolved_name("   ", &held), None);
        assert_eq!(resolved_name("invoice", &[]), None);
    }

    #[test]
    fn resolution_is_order_independent_and_idempotent() {
        let held = files(&["Alpha.pdf", "beta_notes.pdf", "Gamma report.pdf", "alpha beta.pdf"]);
        let labels = ["alpha", "Beta Notes", "gamma-report.pdf", "ALPHA_BETA", "delta"];

        let mut reversed = held.clone();
        reversed.reverse();
        let mut rotated = held.clone();
        rotated.rotate_left(2);

        for label in labels {
            let expected = resolved_name(label, &held);
            assert_eq!(resolved_name(label, &held), expected);
            assert_eq!(resolved_name(label, &reversed), expected, "label {label}");
            assert_eq!(resolved_name(label, &rotated), expected, "label {label}");
        }
        assert_eq!(resolved_name("ALPHA_BETA", &held).as_deref(), Some("alpha beta.pdf"));
    }
}
