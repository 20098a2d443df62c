//! Workflow orchestrator: one fetch → classify → act run.
//!
//! Items are processed strictly in feed order. Per-item failures become an
//! `ItemOutcome` folded into the metrics; only a fetch failure, a
//! non-recoverable board error or a panicking collaborator ends the run early.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::error::{BoardError, PipelineError};
use crate::pipeline::types::{
    BoardClient, BoardConnector, CandidateItem, Classifier, ClassificationDecision, FeedClient,
    ItemOutcome, Priority, Stage, WorkflowMetrics, WorkflowRequest, WorkflowResult,
};

pub const MSG_NO_ITEMS: &str = "No items found";
pub const MSG_SUCCESS: &str = "Workflow executed successfully";

/// Board and list resolved for the current run.
#[derive(Debug, Clone)]
struct Destination {
    board_id: String,
    list_id: String,
}

/// Runs the pipeline for a single request.
pub struct WorkflowOrchestrator {
    feed: Arc<dyn FeedClient>,
    classifier: Arc<dyn Classifier>,
    boards: Arc<dyn BoardConnector>,
}

impl WorkflowOrchestrator {
    pub fn new(
        feed: Arc<dyn FeedClient>,
        classifier: Arc<dyn Classifier>,
        boards: Arc<dyn BoardConnector>,
    ) -> Self {
        Self {
            feed,
            classifier,
            boards,
        }
    }

    /// Execute one run. Never returns an error or unwinds: failures are reported in
    /// the result with the stage they happened at.
    pub async fn run(&self, request: &WorkflowRequest) -> WorkflowResult {
        let started = Instant::now();
        let mut metrics = WorkflowMetrics::default();

        info!(
            product = %request.product_name,
            time_period = %request.time_period,
            max_items = request.max_items,
            "Starting workflow run"
        );

        let outcome = AssertUnwindSafe(self.execute(request, &mut metrics))
            .catch_unwind()
            .await;
        let metrics = metrics.finalize(started.elapsed());

        let result = match outcome {
            Ok(Ok(message)) => WorkflowResult::succeeded(metrics, message),
            Ok(Err(PipelineError::Fetch(e))) => {
                error!(error = %e, "Feed fetch failed, aborting run");
                WorkflowResult::failed(Stage::Fetch, e.to_string(), metrics)
            }
            Ok(Err(e)) => {
                error!(error = %e, "Workflow run aborted");
                WorkflowResult::failed(Stage::Unknown, e.to_string(), metrics)
            }
            Err(payload) => {
                let message = format!("pipeline panicked: {}", panic_message(payload.as_ref()));
                error!(error = %message, "Workflow run aborted");
                WorkflowResult::failed(Stage::Unknown, message, metrics)
            }
        };

        info!(
            success = result.success,
            processed = result.metrics.processed,
            cards_added = result.metrics.cards_added,
            classification_errors = result.metrics.classification_errors,
            card_errors = result.metrics.card_errors,
            time_taken = result.metrics.time_taken,
            "Workflow run finished"
        );
        result
    }

    async fn execute(
        &self,
        request: &WorkflowRequest,
        metrics: &mut WorkflowMetrics,
    ) -> Result<&'static str, PipelineError> {
        let board = self.boards.connect(&request.credentials);

        let items = self
            .feed
            .fetch(&request.product_name, &request.time_period, request.max_items)
            .await?;

        if items.is_empty() {
            info!(product = %request.product_name, "No items found");
            return Ok(MSG_NO_ITEMS);
        }

        info!(count = items.len(), "Fetched items");

        let mut destination: Option<Destination> = None;
        for item in &items {
            match self
                .process_item(item, request, board.as_ref(), &mut destination)
                .await
            {
                Ok(outcome) => metrics.record(&outcome),
                Err(e) => {
                    metrics.processed += 1;
                    return Err(e);
                }
            }
        }

        Ok(MSG_SUCCESS)
    }

    async fn process_item(
        &self,
        item: &CandidateItem,
        request: &WorkflowRequest,
        board: &dyn BoardClient,
        destination: &mut Option<Destination>,
    ) -> Result<ItemOutcome, PipelineError> {
        let decision = match self
            .classifier
            .classify(
                item,
                &request.prioritization_rule,
                &request.product_description,
            )
            .await
        {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    item_id = %item.id,
                    stage = %Stage::Classify,
                    error = %e,
                    "Classification failed, continuing"
                );
                return Ok(ItemOutcome::ClassificationFailed);
            }
        };

        match decision {
            ClassificationDecision::Skip { reason } => {
                debug!(
                    item_id = %item.id,
                    reason = reason.as_deref().unwrap_or("none"),
                    "Item not actionable"
                );
                Ok(ItemOutcome::Skipped)
            }
            ClassificationDecision::Add {
                title,
                priority,
                description,
                ..
            } => {
                self.act(item, request, board, destination, &title, priority, &description)
                    .await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn act(
        &self,
        item: &CandidateItem,
        request: &WorkflowRequest,
        board: &dyn BoardClient,
        destination: &mut Option<Destination>,
        title: &str,
        priority: Priority,
        description: &str,
    ) -> Result<ItemOutcome, PipelineError> {
        let list_id = match destination.as_ref().map(|d| d.list_id.clone()) {
            Some(list_id) => list_id,
            None => match resolve_destination(board, request).await {
                Ok(dest) => {
                    debug!(board_id = %dest.board_id, list_id = %dest.list_id, "Destination resolved");
                    let list_id = dest.list_id.clone();
                    *destination = Some(dest);
                    list_id
                }
                Err(e) => return absorb_board_error(item, e),
            },
        };

        match board.create_card(&list_id, title, priority, description).await {
            Ok(card) => {
                info!(
                    item_id = %item.id,
                    card_id = %card.id,
                    card_name = %card.name,
                    "Created card"
                );
                Ok(ItemOutcome::CardCreated(card))
            }
            Err(e) => absorb_board_error(item, e),
        }
    }
}

async fn resolve_destination(
    board: &dyn BoardClient,
    request: &WorkflowRequest,
) -> Result<Destination, BoardError> {
    let board_id = board
        .ensure_destination(request.board_id(), request.board_name())
        .await?;
    let list_id = board.ensure_list(&board_id, &request.list_name).await?;
    Ok(Destination { board_id, list_id })
}

/// Count a recoverable board failure against the item; escalate the rest.
fn absorb_board_error(item: &CandidateItem, e: BoardError) -> Result<ItemOutcome, PipelineError> {
    if e.is_recoverable() {
        warn!(
            item_id = %item.id,
            stage = %Stage::Act,
            error = %e,
            "Card creation failed, continuing"
        );
        Ok(ItemOutcome::CardFailed)
    } else {
        Err(e.into())
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
