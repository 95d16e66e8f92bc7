//! Per-position program resolution and decoding for one transaction.
//!
//! Each top-level instruction is a position. Its candidates are the top-level program
//! followed by the programs of its inner instructions in execution order; the first
//! candidate with a schema becomes the position's active program. Utility programs reached
//! through CPI only fill in when nothing after them resolves. Every instruction in the
//! position run by that program is decoded, along with the log payloads it emitted.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::decode::{DecodedRecord, PayloadOrigin, RawPayload, decode_payload};
use crate::extract::{ExtractionContext, SemanticEvent, extractor_for};
use crate::logs::{LogPayload, extract_program_data};
use crate::protocols::Protocol;
use crate::schema::ProgramSchema;
use crate::schema::registry::SchemaRegistry;
use crate::types::Transaction;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum InstructionOutcome {
    Decoded {
        record: DecodedRecord,
    },
    NoMatch {
        program_id: String,
        origin: PayloadOrigin,
    },
    Failed {
        program_id: String,
        origin: PayloadOrigin,
        error: String,
    },
}

impl InstructionOutcome {
    pub fn record(&self) -> Option<&DecodedRecord> {
        match self {
            Self::Decoded { record } => Some(record),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateError {
    pub program_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionReport {
    pub index: usize,
    /// `None` when no candidate program has a schema.
    pub active_program: Option<String>,
    pub candidates: Vec<String>,
    pub fetch_errors: Vec<CandidateError>,
    pub outcomes: Vec<InstructionOutcome>,
    pub extraction_errors: Vec<String>,
}

impl PositionReport {
    pub fn is_unknown(&self) -> bool {
        self.active_program.is_none()
    }

    pub fn records(&self) -> impl Iterator<Item = &DecodedRecord> {
        self.outcomes.iter().filter_map(InstructionOutcome::record)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReport {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub fee: u64,
    /// Failed transactions are decoded but yield no events.
    pub failed: bool,
    pub positions: Vec<PositionReport>,
    pub events: Vec<SemanticEvent>,
}

impl TransactionReport {
    pub fn failures(&self) -> impl Iterator<Item = &InstructionOutcome> {
        self.positions
            .iter()
            .flat_map(|p| &p.outcomes)
            .filter(|o| matches!(o, InstructionOutcome::Failed { .. }))
    }
}

/// Top-level program first, then inner programs in execution order, without repeats.
pub fn candidate_programs(tx: &Transaction, position: usize) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    let top = tx.instructions.get(position).map(|ix| &ix.program_id);
    let inner = tx.inner_group(position).iter().map(|ix| &ix.program_id);
    for program_id in top.into_iter().chain(inner) {
        if !candidates.iter().any(|c| c == program_id) {
            candidates.push(program_id.clone());
        }
    }
    candidates
}

pub struct TransactionCorrelator<'r> {
    registry: &'r SchemaRegistry,
    decode_logs: bool,
}

impl<'r> TransactionCorrelator<'r> {
    pub fn new(registry: &'r SchemaRegistry, decode_logs: bool) -> Self {
        Self {
            registry,
            decode_logs,
        }
    }

    pub async fn correlate(&self, tx: &Transaction) -> TransactionReport {
        let log_payloads = if self.decode_logs {
            extract_program_data(&tx.log_messages)
        } else {
            Vec::new()
        };

        let mut positions = Vec::with_capacity(tx.instructions.len());
        let mut events = Vec::new();
        for index in 0..tx.instructions.len() {
            let (position, position_events) =
                self.correlate_position(tx, index, &log_payloads).await;
            positions.push(position);
            if tx.is_failed() {
                continue;
            }
            events.extend(position_events);
        }

        TransactionReport {
            signature: tx.signature.clone(),
            slot: tx.slot,
            block_time: tx.block_time,
            fee: tx.fee,
            failed: tx.is_failed(),
            positions,
            events,
        }
    }

    async fn correlate_position(
        &self,
        tx: &Transaction,
        index: usize,
        log_payloads: &[LogPayload],
    ) -> (PositionReport, Vec<SemanticEvent>) {
        let candidates = candidate_programs(tx, index);
        let mut report = PositionReport {
            index,
            active_program: None,
            candidates: candidates.clone(),
            fetch_errors: Vec::new(),
            outcomes: Vec::new(),
            extraction_errors: Vec::new(),
        };

        let mut active = None;
        let mut utility = None;
        for (rank, program_id) in candidates.iter().enumerate() {
            let Some(schema) = self.resolve_recording(program_id, &mut report).await else {
                continue;
            };
            if rank > 0 && is_utility_program(program_id) {
                utility.get_or_insert(schema);
                continue;
            }
            active = Some(schema);
            break;
        }
        let Some(active) = active.or(utility) else {
            debug!(signature = %tx.signature, position = index, "no known program");
            return (report, Vec::new());
        };
        report.active_program = Some(active.program_id.clone());

        let extractor = Protocol::from_program_id(&active.program_id).map(extractor_for);
        let mut schemas: HashMap<&str, Arc<ProgramSchema>> = HashMap::new();
        schemas.insert(active.program_id.as_str(), Arc::clone(&active));
        for &aux in extractor.map_or(&[][..], |e| e.auxiliary_programs()) {
            if let Some(schema) = self.resolve_recording(aux, &mut report).await {
                schemas.insert(aux, schema);
            }
        }

        let signature = Some(tx.signature.as_str());
        let mut payloads = Vec::new();
        if let Some(ix) = tx.instructions.get(index) {
            payloads.push(RawPayload {
                program_id: &ix.program_id,
                data: &ix.data,
                accounts: &ix.accounts,
                origin: PayloadOrigin::TopLevel { index },
                signature,
            });
        }
        for (inner_index, ix) in tx.inner_group(index).iter().enumerate() {
            payloads.push(RawPayload {
                program_id: &ix.program_id,
                data: &ix.data,
                accounts: &ix.accounts,
                origin: PayloadOrigin::Inner {
                    top_level: index,
                    index: inner_index,
                },
                signature,
            });
        }
        for log in log_payloads.iter().filter(|l| l.top_level == Some(index)) {
            if let Some(program_id) = log.program_id.as_deref()
                && program_id == active.program_id
            {
                payloads.push(RawPayload {
                    program_id,
                    data: &log.data,
                    accounts: &[],
                    origin: PayloadOrigin::Log {
                        top_level: log.top_level,
                        index: log.index,
                    },
                    signature,
                });
            }
        }

        for payload in &payloads {
            let Some(schema) = schemas.get(payload.program_id) else {
                continue;
            };
            let outcome = decode_outcome(schema, payload, &tx.signature, index);
            report.outcomes.push(outcome);
        }

        let Some(extractor) = extractor else {
            return (report, Vec::new());
        };
        let records: Vec<DecodedRecord> = report.records().cloned().collect();
        let ctx = ExtractionContext {
            transaction: tx,
            position: index,
            records: &records,
        };
        let mut events = Vec::new();
        for result in extractor.extract(&ctx) {
            match result {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!(
                        signature = %tx.signature,
                        position = index,
                        error = %e,
                        "extraction failed"
                    );
                    report.extraction_errors.push(e.to_string());
                }
            }
        }
        (report, events)
    }

    async fn resolve_recording(
        &self,
        program_id: &str,
        report: &mut PositionReport,
    ) -> Option<Arc<ProgramSchema>> {
        match self.registry.resolve(program_id).await {
            Ok(schema) => schema,
            Err(e) => {
                report.fetch_errors.push(CandidateError {
                    program_id: program_id.to_string(),
                    error: e.to_string(),
                });
                None
            }
        }
    }
}

fn is_utility_program(program_id: &str) -> bool {
    Protocol::from_program_id(program_id).is_some_and(Protocol::is_utility)
}

fn decode_outcome(
    schema: &ProgramSchema,
    payload: &RawPayload<'_>,
    signature: &str,
    position: usize,
) -> InstructionOutcome {
    match decode_payload(schema, payload) {
        Ok(Some(record)) => InstructionOutcome::Decoded { record },
        Ok(None) => InstructionOutcome::NoMatch {
            program_id: payload.program_id.to_string(),
            origin: payload.origin,
        },
        Err(e) => {
            warn!(
                %signature,
                position,
                program_id = %payload.program_id,
                error = %e,
                "decode failed"
            );
            InstructionOutcome::Failed {
                program_id: payload.program_id.to_string(),
                origin: payload.origin,
                error: e.to_string(),
            }
        }
    }
}
