use serde::Serialize;

use super::skeleton::PLACEHOLDER_MARKERS;

/// Artifacts must be longer than this many characters to pass readiness
/// and verification.
pub const MIN_CONTENT_LEN: usize = 500;

/// Substrings whose presence signals that rendered React content was written.
pub const READINESS_MARKERS: [&str; 2] = ["ReactDOM", "text/babel"];

pub const VERIFICATION_FAILED: &str = "Site verification failed: missing required components";

fn has_enough_content(content: &str) -> bool {
    content.chars().count() > MIN_CONTENT_LEN
}

fn has_placeholders(content: &str) -> bool {
    PLACEHOLDER_MARKERS.iter().any(|m| content.contains(m))
}

/// Readiness heuristic: placeholders gone, big enough, expected format present.
pub fn is_content_complete(content: &str) -> bool {
    !has_placeholders(content)
        && has_enough_content(content)
        && READINESS_MARKERS.iter().all(|m| content.contains(m))
}

/// Individual outcomes of the final structural verification.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VerificationReport {
    pub has_react: bool,
    pub has_tailwind: bool,
    pub has_root: bool,
    pub has_content: bool,
    pub no_placeholders: bool,
}

impl VerificationReport {
    pub fn inspect(content: &str) -> Self {
        Self {
            has_react: ["React", "react", "ReactDOM"].iter().any(|m| content.contains(m)),
            has_tailwind: content.to_lowercase().contains("tailwindcss"),
            has_root: content.contains(r#"<div id="root">"#),
            has_content: has_enough_content(content),
            no_placeholders: !has_placeholders(content),
        }
    }

    pub fn missing() -> Self {
        Self {
            has_react: false,
            has_tailwind: false,
            has_root: false,
            has_content: false,
            no_placeholders: false,
        }
    }

    pub fn passed(&self) -> bool {
        self.has_react && self.has_tailwind && self.has_root && self.has_content && self.no_placeholders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::skeleton::{render, BUILTIN_TEMPLATE, CONTENT_PLACEHOLDER};
    use sitesmith_test_utils::{sample_site_body, sample_site_html};

    #[test]
    fn test_fresh_skeleton_is_not_ready() {
        let skeleton = render(BUILTIN_TEMPLATE, "Site", "A page");
        assert!(!is_content_complete(&skeleton));
        assert!(!VerificationReport::inspect(&skeleton).passed());
    }

    #[test]
    fn test_filled_skeleton_is_ready_and_verifies() {
        let skeleton = render(BUILTIN_TEMPLATE, "Site", "A page");
        let filled = skeleton.replace(CONTENT_PLACEHOLDER, &sample_site_body());
        assert!(is_content_complete(&filled));
        let report = VerificationReport::inspect(&filled);
        assert!(report.passed(), "{:?}", report);
    }

    #[test]
    fn test_sample_page_passes() {
        assert!(is_content_complete(&sample_site_html()));
        assert!(VerificationReport::inspect(&sample_site_html()).passed());
    }

    #[test]
    fn test_small_content_fails_both() {
        let tiny = r#"<div id="root"></div><script type="text/babel">ReactDOM tailwindcss</script>"#;
        assert!(!is_content_complete(tiny));
        let report = VerificationReport::inspect(tiny);
        assert!(!report.has_content);
        assert!(!report.passed());
    }

    #[test]
    fn test_leftover_placeholder_fails_verification() {
        let html = format!("{}{}", sample_site_html(), CONTENT_PLACEHOLDER);
        assert!(!is_content_complete(&html));
        assert!(!VerificationReport::inspect(&html).no_placeholders);
    }

    #[test]
    fn test_missing_report_fails() {
        assert!(!VerificationReport::missing().passed());
    }

    #[test]
    fn test_length_threshold_counts_characters_and_agrees() {
        let base = r#"<div id="root"></div><script type="text/babel">ReactDOM tailwindcss</script>"#;
        let pad = |total: usize, ch: char| {
            let mut s = base.to_string();
            s.extend(std::iter::repeat(ch).take(total - base.chars().count()));
            s
        };

        let exact = pad(MIN_CONTENT_LEN, 'a');
        assert!(!is_content_complete(&exact));
        assert!(!VerificationReport::inspect(&exact).has_content);

        let over = pad(MIN_CONTENT_LEN + 1, 'a');
        assert!(is_content_complete(&over));
        assert!(VerificationReport::inspect(&over).passed());

        // Over 500 bytes but not over 500 characters.
        let wide = pad(400, 'ä');
        assert!(wide.len() > MIN_CONTENT_LEN);
        assert!(!is_content_complete(&wide));
        assert!(!VerificationReport::inspect(&wide).has_content);
    }
}
