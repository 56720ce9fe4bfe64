//! Structural validation and the single repair pass for non-core
//! artifacts (`spec.md` §4.6 step 4).

use cg_domain::model::ContentType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    Invalid(String),
}

/// Validates structure for the given content type. `blog` requires a
/// title line, at least one paragraph, and at least 100 words — it is
/// never repaired (well-formed from the editor stage by construction).
/// `social`/`audio`/`video` are held to a lighter non-empty-body bar
/// since their "structure" is type-specific and largely opaque to the
/// core (the actual generation happens in the external orchestrator);
/// what the core can and does check is that a deliverable was actually
/// produced.
pub fn validate_structure(content_type: ContentType, content: &str) -> ValidationOutcome {
    match content_type {
        ContentType::Blog => validate_blog(content),
        ContentType::Social | ContentType::Audio | ContentType::Video => validate_terminal(content),
    }
}

/// Validates a stage's raw output (text or asset) against its
/// deliverable type. Audio/video deliverables have no structural text to
/// check, so "structure" there means a populated asset reference.
pub fn validate_output(
    content_type: ContentType,
    content: Option<&str>,
    asset_uri: Option<&str>,
) -> ValidationOutcome {
    match content_type {
        ContentType::Blog => match content {
            Some(c) => validate_blog(c),
            None => ValidationOutcome::Invalid("missing content".into()),
        },
        ContentType::Social => match content {
            Some(c) => validate_terminal(c),
            None => ValidationOutcome::Invalid("missing content".into()),
        },
        ContentType::Audio | ContentType::Video => match asset_uri {
            Some(u) if !u.trim().is_empty() => ValidationOutcome::Valid,
            _ => ValidationOutcome::Invalid("missing asset_uri".into()),
        },
    }
}

fn validate_blog(content: &str) -> ValidationOutcome {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let Some(title) = lines.next() else {
        return ValidationOutcome::Invalid("missing title".into());
    };
    if title.trim().is_empty() {
        return ValidationOutcome::Invalid("missing title".into());
    }

    let paragraph_count = lines.count();
    if paragraph_count < 1 {
        return ValidationOutcome::Invalid("missing body paragraph".into());
    }

    let word_count = content.split_whitespace().count();
    if word_count < 100 {
        return ValidationOutcome::Invalid(format!("only {word_count} words, need >= 100"));
    }

    ValidationOutcome::Valid
}

fn validate_terminal(content: &str) -> ValidationOutcome {
    if content.trim().is_empty() {
        ValidationOutcome::Invalid("empty deliverable".into())
    } else {
        ValidationOutcome::Valid
    }
}

/// `blog` artifacts skip repair entirely (`spec.md` §4.6 step 4); only
/// non-core types are eligible for the one repair pass.
pub fn is_repairable(content_type: ContentType) -> bool {
    !content_type.is_core()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blog_with_title_one_paragraph_and_enough_words_is_valid() {
        let body = "word ".repeat(100);
        let content = format!("My Great Title\n\n{body}");
        assert_eq!(validate_structure(ContentType::Blog, &content), ValidationOutcome::Valid);
    }

    #[test]
    fn blog_under_100_words_is_invalid() {
        let content = "My Title\n\nonly a few words here".to_string();
        assert!(matches!(validate_structure(ContentType::Blog, &content), ValidationOutcome::Invalid(_)));
    }

    #[test]
    fn blog_missing_title_is_invalid() {
        assert!(matches!(validate_structure(ContentType::Blog, "\n\nbody only"), ValidationOutcome::Invalid(_)));
    }

    #[test]
    fn social_requires_non_empty_body() {
        assert_eq!(validate_structure(ContentType::Social, "a post"), ValidationOutcome::Valid);
        assert!(matches!(validate_structure(ContentType::Social, "   "), ValidationOutcome::Invalid(_)));
    }

    #[test]
    fn audio_output_valid_only_with_asset_uri() {
        assert_eq!(
            validate_output(ContentType::Audio, None, Some("asset://audio/1.mp3")),
            ValidationOutcome::Valid
        );
        assert!(matches!(
            validate_output(ContentType::Video, None, None),
            ValidationOutcome::Invalid(_)
        ));
    }

    #[test]
    fn blog_is_never_repairable_but_social_is() {
        assert!(!is_repairable(ContentType::Blog));
        assert!(is_repairable(ContentType::Social));
        assert!(is_repairable(ContentType::Audio));
        assert!(is_repairable(ContentType::Video));
    }
}
