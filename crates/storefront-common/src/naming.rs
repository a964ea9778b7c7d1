//! Namespace and release name generation
//!
//! Names must be valid DNS-1123 labels: lowercase alphanumerics and `-`,
//! starting and ending with an alphanumeric, at most 63 characters. The
//! sanitized part of a namespace depends only on the display name; the
//! trailing suffix is random so two stores with the same name never share a
//! namespace, without having to look at existing records.

use uuid::Uuid;

use crate::store::StoreId;

/// Leading token on every generated name
pub const NAME_PREFIX: &str = "store";

/// Substituted when a display name has no usable characters at all
pub const FALLBACK_NAME_TOKEN: &str = "unnamed";

/// Length of the random namespace suffix
pub const SUFFIX_LEN: usize = 8;

/// Kubernetes namespace name length limit
pub const MAX_NAMESPACE_LEN: usize = 63;

/// Room left for the sanitized name: `store-<sanitized>-<suffix>`
const MAX_SANITIZED_LEN: usize = MAX_NAMESPACE_LEN - NAME_PREFIX.len() - 2 - SUFFIX_LEN;

/// Cluster identifiers derived for a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreIdentifiers {
    /// Namespace the store's workloads run in
    pub namespace: String,
    /// Helm release name
    pub release: String,
}

impl StoreIdentifiers {
    /// Derive a fresh namespace from `name` and the release name from `id`
    pub fn generate(name: &str, id: &StoreId) -> Self {
        Self {
            namespace: format!("{}{}", namespace_prefix(name), random_suffix()),
            release: release_name(id),
        }
    }
}

/// Lowercase `name` and replace anything outside `[a-z0-9-]` with `-`
///
/// Deterministic. Returns [`FALLBACK_NAME_TOKEN`] when nothing alphanumeric
/// survives, and truncates so the full namespace fits in 63 characters.
pub fn sanitize_name(name: &str) -> String {
    let mut sanitized: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();

    if !sanitized.chars().any(|c| c.is_ascii_alphanumeric()) {
        return FALLBACK_NAME_TOKEN.to_string();
    }

    // every char is ASCII at this point, so byte truncation is safe
    sanitized.truncate(MAX_SANITIZED_LEN);
    sanitized
}

/// The non-random part of a namespace generated for `name`
pub fn namespace_prefix(name: &str) -> String {
    format!("{}-{}-", NAME_PREFIX, sanitize_name(name))
}

/// Release name for a store id: `store-<first id segment>`
pub fn release_name(id: &StoreId) -> String {
    let short: String = id
        .short()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(SUFFIX_LEN)
        .collect();
    if short.is_empty() {
        return format!("{}-{}", NAME_PREFIX, random_suffix());
    }
    format!("{}-{}", NAME_PREFIX, short)
}

fn random_suffix() -> String {
    let mut suffix = Uuid::new_v4().simple().to_string();
    suffix.truncate(SUFFIX_LEN);
    suffix
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn is_dns_label(s: &str) -> bool {
        !s.is_empty()
            && s.len() <= MAX_NAMESPACE_LEN
            && s.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && s.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
            && s.chars().last().is_some_and(|c| c.is_ascii_alphanumeric())
    }

    mod sanitization {
        use super::*;

        #[test]
        fn punctuation_and_spaces_become_hyphens() {
            assert_eq!(sanitize_name("My Store!"), "my-store-");
            assert_eq!(namespace_prefix("My Store!"), "store-my-store--");
        }

        #[test]
        fn valid_names_pass_through_lowercased() {
            assert_eq!(sanitize_name("acme-42"), "acme-42");
            assert_eq!(sanitize_name("ACME"), "acme");
        }

        #[test]
        fn surrounding_whitespace_is_ignored() {
            assert_eq!(sanitize_name("  Acme  "), "acme");
        }

        #[test]
        fn non_ascii_letters_are_replaced() {
            assert_eq!(sanitize_name("Café"), "caf-");
        }

        #[test]
        fn names_without_alphanumerics_fall_back() {
            assert_eq!(sanitize_name("!!!"), FALLBACK_NAME_TOKEN);
            assert_eq!(sanitize_name("---"), FALLBACK_NAME_TOKEN);
            assert_eq!(sanitize_name("日本"), FALLBACK_NAME_TOKEN);
        }

        #[test]
        fn sanitization_is_deterministic() {
            for name in ["My Store!", "a b c", "Shop #1"] {
                assert_eq!(sanitize_name(name), sanitize_name(name));
            }
        }
    }

    mod generation {
        use super::*;

        #[test]
        fn namespace_is_prefix_plus_random_suffix() {
            let id = StoreId::generate();
            let ids = StoreIdentifiers::generate("My Store!", &id);

            let prefix = namespace_prefix("My Store!");
            assert!(ids.namespace.starts_with(&prefix));
            let suffix = &ids.namespace[prefix.len()..];
            assert_eq!(suffix.len(), SUFFIX_LEN);
            assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        }

        #[test]
        fn repeated_generation_never_collides() {
            let id = StoreId::generate();
            let namespaces: HashSet<String> = (0..500)
                .map(|_| StoreIdentifiers::generate("Acme", &id).namespace)
                .collect();
            assert_eq!(namespaces.len(), 500);
        }

        #[test]
        fn generated_names_are_valid_labels() {
            let long = "x".repeat(200);
            for name in ["My Store!", "!!!", "Café", long.as_str(), "-edge-"] {
                let ids = StoreIdentifiers::generate(name, &StoreId::generate());
                assert!(is_dns_label(&ids.namespace), "bad namespace {}", ids.namespace);
                assert!(is_dns_label(&ids.release), "bad release {}", ids.release);
            }
        }

        #[test]
        fn long_names_are_truncated_to_fit() {
            let ids = StoreIdentifiers::generate(&"a".repeat(100), &StoreId::generate());
            assert_eq!(ids.namespace.len(), MAX_NAMESPACE_LEN);
        }

        #[test]
        fn release_derives_from_store_id() {
            let id = StoreId::from("1A2B3C4D-aaaa-4bbb-8ccc-dddddddddddd");
            assert_eq!(release_name(&id), "store-1a2b3c4d");
        }

        #[test]
        fn release_for_unusable_id_is_still_valid() {
            let release = release_name(&StoreId::from("!!!"));
            assert!(release.starts_with("store-"));
            assert!(is_dns_label(&release));
        }
    }
}
