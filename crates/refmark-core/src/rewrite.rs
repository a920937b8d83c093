//! Tag substitution back into the annotation text.
//!
//! Every tag the MarkerParser inserted is replaced with the canonical
//! record's preferred representation: an internal cross-link when the item
//! is already catalogued, a labeled external link when only a URL is known,
//! or a visible TODO placeholder when nothing resolved. The placeholder
//! encodes the key in plain text, so unresolved references stay findable
//! and fixable instead of silently keeping the original marker.

use std::collections::{BTreeMap, BTreeSet};

use crate::markers::tag_for;
use crate::{Diagnostic, DiagnosticKind, Reference, ReferenceKey, ResolveConfig};

/// Replace every key's tag in `expanded` text.
pub fn rewrite(
    expanded: &str,
    keys: &[ReferenceKey],
    allowlist: &BTreeSet<ReferenceKey>,
    records: &BTreeMap<ReferenceKey, Reference>,
    config: &ResolveConfig,
) -> (String, Vec<Diagnostic>) {
    let mut text = expanded.to_string();
    let mut diagnostics = Vec::new();

    for key in keys {
        let tag = tag_for(key);
        if !allowlist.contains(key) {
            text = text.replace(&tag, &placeholder(key));
            continue;
        }
        match records.get(key) {
            Some(record) if record.internal_key.is_some() => {
                let ckey = record.internal_key.as_deref().unwrap_or_default();
                let link = format!(
                    "[[{}{}{}]]",
                    config.internal_link_prefix, ckey, config.internal_link_suffix
                );
                log::debug!("{key} -> {link}");
                text = text.replace(&tag, &link);
            }
            Some(record) if record.url.is_some() => {
                let url = record.url.as_deref().unwrap_or_default();
                let title = record.title.as_deref().unwrap_or_default();
                let link = format!("[REF_{key}:{title}]({url})");
                log::debug!("{key} -> {link}");
                text = text.replace(&tag, &link);
            }
            Some(record) if record.is_resolved() => {
                // Title or DOI but nothing link-worthy: report, leave the
                // tag's span to the informational output.
                diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::PartialOnly,
                    key: Some(key.clone()),
                    message: format!(
                        "{key} has metadata (title {:?}, doi {:?}) but no link target",
                        record.title, record.doi
                    ),
                });
            }
            _ => {
                text = text.replace(&tag, &placeholder(key));
            }
        }
    }

    (text, diagnostics)
}

/// Visible placeholder for a reference that could not be resolved.
pub fn placeholder(key: &ReferenceKey) -> String {
    format!("[[TODO:{key}]]")
}
