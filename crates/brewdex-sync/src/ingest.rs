//! Response ingestion: parse, design, submit.
//!
//! This is the inbound edge for the fetch layer. A response that cannot be
//! read at all is reported as `(false, message)` and the session is asked to
//! offer a retry; individual bad sub-documents are logged and skipped.

use brewdex_core::{draft::Draft, record::RecordKind};
use brewdex_parse::{Parsed, ResponseKind};
use serde::Serialize;

use crate::{
  Result,
  designer::{RecordSink, design_and_submit},
  session::{Message, Session, Source},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
  pub ok:        bool,
  pub message:   String,
  pub submitted: usize,
  pub rejected:  usize,
}

/// The query-specific identifier a designer should apply to `draft`.
pub fn context_for<'a>(kind: &'a ResponseKind, draft: &Draft) -> Option<&'a str> {
  match (kind, draft.kind()) {
    (ResponseKind::BeersForBrewery(id), RecordKind::Beer) => Some(id.as_str()),
    (ResponseKind::BreweriesForStyle(id), RecordKind::Brewery) => Some(id.as_str()),
    _ => None,
  }
}

/// Parse `input` as `kind` and submit every designed record to `sink`.
///
/// Parse failures do not return `Err`; they come back as a report with
/// `ok == false`. `Err` means the sink refused a record.
pub async fn ingest<K: RecordSink>(
  sink: &K,
  session: &Session,
  input: &str,
  kind: &ResponseKind,
) -> Result<IngestReport> {
  let Parsed { drafts, rejected } = match brewdex_parse::parse(input, kind) {
    Ok(parsed) => parsed,
    Err(err) => {
      tracing::warn!(?kind, error = %err, "response could not be parsed");
      session.notify(Source::Ingest, Message::Retry);
      return Ok(IngestReport {
        ok:        false,
        message:   err.to_string(),
        submitted: 0,
        rejected:  0,
      });
    }
  };

  for rejection in &rejected {
    tracing::info!(
      index = rejection.index,
      kind = %rejection.kind,
      id = rejection.id.as_deref().unwrap_or("-"),
      reason = %rejection.reason,
      "skipped sub-document"
    );
  }

  let submitted = drafts.len();
  for draft in drafts {
    let context = context_for(kind, &draft);
    design_and_submit(sink, draft, context).await?;
  }

  let message = format!(
    "submitted {submitted} record(s), skipped {} invalid sub-document(s)",
    rejected.len()
  );
  tracing::debug!(?kind, submitted, rejected = rejected.len(), "ingested response");
  Ok(IngestReport { ok: true, message, submitted, rejected: rejected.len() })
}
