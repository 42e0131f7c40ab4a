//! Shared stream-chunk aggregation helpers
//!
//! Each `Outbound::aggregate_stream_chunks` delegates here for the part of
//! the job that is provider-agnostic: folding a run of unified response
//! chunks into one body plus metadata. Providers only need to supply the
//! final re-encoding into their own wire shape.

use portal_core::model::{FinishReason, ResponseStreamItem, Usage};

use crate::outbound::ResponseMeta;

/// Fold a run of unified stream chunks into combined text, final usage, and
/// the terminal finish reason
#[must_use]
pub fn fold_text_and_meta(chunks: &[ResponseStreamItem]) -> (String, ResponseMeta) {
    let mut text = String::new();
    let mut meta = ResponseMeta::default();

    for item in chunks {
        let ResponseStreamItem::Chunk(response) = item else {
            continue;
        };

        if meta.model.is_none() {
            meta.model = Some(response.model.clone());
        }

        for choice in &response.choices {
            if let Some(delta) = &choice.delta
                && let Some(content) = &delta.content
            {
                text.push_str(content);
            }
            if let Some(reason) = choice.finish_reason {
                meta.finish_reason = Some(reason);
            }
        }

        if let Some(usage) = &response.usage {
            meta.usage = Some(merge_usage(meta.usage.as_ref(), usage));
        }
    }

    if meta.finish_reason.is_none() {
        meta.finish_reason = Some(FinishReason::Stop);
    }

    (text, meta)
}

/// Reconcile a running usage total with a newly observed block
///
/// Providers typically report a cumulative usage block on each chunk that
/// carries one at all, so the block with the larger `total_tokens` is the
/// more complete one; keep it rather than always overwriting with whatever
/// arrived last.
fn merge_usage(existing: Option<&Usage>, incoming: &Usage) -> Usage {
    match existing {
        Some(existing) if existing.total_tokens > incoming.total_tokens => existing.clone(),
        _ => incoming.clone(),
    }
}
