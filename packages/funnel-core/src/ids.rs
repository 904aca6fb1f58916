/// Identifier helpers.
///
/// Cards, notes, history entries, files and notifications get uuid v4 ids
/// generated on the client. Sections get a short opaque token. Stage ids are
/// slugs derived from the stage name.
use unicode_normalization::UnicodeNormalization;

/// Client-generated record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Short opaque token: the first 8 hex chars of a v4 uuid.
pub fn generate_token() -> String {
    let mut token = uuid::Uuid::new_v4().simple().to_string();
    token.truncate(8);
    token
}

/// Lowercase slug: accents folded, runs of anything outside `[a-z0-9]`
/// collapsed to a single `-`, no leading or trailing `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.nfkd().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else if c.is_ascii() || c.is_whitespace() {
            pending_dash = true;
        }
        // Non-ASCII remainders (combining marks after NFKD) are dropped.
    }
    slug
}

/// Stage id for `name`, unique against `existing` by `-2`, `-3`, ... suffixes.
/// Falls back to a random id when the name has no slug characters.
pub fn unique_stage_id<'a>(name: &str, existing: impl IntoIterator<Item = &'a str>) -> String {
    let existing: Vec<&str> = existing.into_iter().collect();
    let base = match slugify(name) {
        slug if slug.is_empty() => format!("stage-{}", generate_token()),
        slug => slug,
    };
    if !existing.contains(&base.as_str()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !existing.contains(&candidate.as_str()) {
            return candidate;
        }
        n += 1;
    }
}
