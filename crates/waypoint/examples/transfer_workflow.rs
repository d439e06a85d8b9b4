//! Durable transfer processing with snapshots, snoozing and compensation.
//!
//! Demonstrates:
//! - Persisting a snapshot after every step from `WorkflowHooks`
//! - Rebuilding the workflow and resuming from the stored snapshot
//! - Snoozing while a transaction waits for confirmations
//! - Routing a failed transfer into a compensation stage via `on_failure`

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use waypoint::prelude::*;

const REQUIRED_CONFIRMATIONS: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Transfer {
    id: String,
    to: String,
    amount: u64,
}

/// Stand-in for a chain RPC client.
#[derive(Default)]
struct Chain {
    balance: u64,
    broadcast_attempts: AtomicU32,
    confirmations: AtomicU32,
}

/// Snapshot storage keyed by transfer id.
#[derive(Default)]
struct SnapshotStore {
    snapshots: Mutex<HashMap<String, String>>,
}

impl SnapshotStore {
    fn save(&self, transfer_id: &str, snapshot: &Snapshot) -> Result<(), WorkflowError> {
        let json = snapshot.to_json()?;
        self.snapshots.lock().insert(transfer_id.to_string(), json);
        Ok(())
    }

    fn load(&self, transfer_id: &str) -> Option<String> {
        self.snapshots.lock().get(transfer_id).cloned()
    }
}

struct TransferHooks {
    store: Arc<SnapshotStore>,
    transfer_id: String,
}

#[async_trait]
impl WorkflowHooks for TransferHooks {
    async fn after_each_step(&self, ctx: &StepContext) -> Result<(), StepError> {
        self.store
            .save(&self.transfer_id, &ctx.workflow().snapshot())
            .map_err(StepError::other)
    }

    async fn after_workflow(&self, workflow: &WorkflowHandle) -> Result<(), StepError> {
        self.store
            .save(&self.transfer_id, &workflow.snapshot())
            .map_err(StepError::other)
    }

    async fn on_failure(
        &self,
        workflow: &WorkflowHandle,
        error: &WorkflowError,
    ) -> FailureDisposition {
        if error.snooze_delay().is_some() {
            return FailureDisposition::Propagate;
        }

        workflow.update(|s| {
            s.custom_error = Some(serde_json::json!({ "reason": error.to_string() }));
            s.next_stage = Some("compensate".into());
        });
        match self.store.save(&self.transfer_id, &workflow.snapshot()) {
            Ok(()) => FailureDisposition::Suppress,
            Err(_) => FailureDisposition::Propagate,
        }
    }
}

struct Broadcast {
    chain: Arc<Chain>,
}

#[async_trait]
impl StepFn for Broadcast {
    async fn call(&self, ctx: StepContext) -> Result<(), StepError> {
        let attempt = self.chain.broadcast_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt == 1 {
            return Err(StepError::failed("node returned 503"));
        }
        let transfer: Transfer = ctx
            .step_arg("prepare", "validate", "transfer")
            .map(serde_json::from_value)
            .transpose()
            .map_err(StepError::other)?
            .ok_or_else(|| StepError::failed("transfer not validated"))?;
        ctx.set_arg("tx_hash", format!("0x{:x}{:04}", transfer.amount, attempt))
            .map_err(StepError::other)
    }
}

fn build_workflow(
    transfer: &Transfer,
    chain: Arc<Chain>,
    store: Arc<SnapshotStore>,
) -> Result<Workflow, WorkflowError> {
    let validate = {
        let transfer = transfer.clone();
        let chain = chain.clone();
        Step::new("validate").func(move |ctx: StepContext| {
            let transfer = transfer.clone();
            let chain = chain.clone();
            async move {
                if transfer.amount > chain.balance {
                    return Err(StepError::failed(format!(
                        "insufficient balance: {} > {}",
                        transfer.amount, chain.balance
                    )));
                }
                ctx.set_arg("transfer", &transfer).map_err(StepError::other)
            }
        })
    };

    let confirm = {
        let chain = chain.clone();
        Step::new("confirm").finish_workflow().func(move |_ctx: StepContext| {
            let chain = chain.clone();
            async move {
                let seen = chain.confirmations.fetch_add(1, Ordering::SeqCst) + 1;
                if seen < REQUIRED_CONFIRMATIONS {
                    let pending = format!("{seen}/{REQUIRED_CONFIRMATIONS} confirmations");
                    return Err(StepError::failed(pending).snooze(Duration::from_millis(200)));
                }
                Ok(())
            }
        })
    };

    let refund = Step::new("refund").func(|ctx: StepContext| async move {
        let reason = ctx.workflow().state().custom_error;
        info!("Refunding transfer, reason: {:?}", reason);
        ctx.set_arg("refunded", true).map_err(StepError::other)
    });

    Workflow::builder()
        .stage(Stage::new("prepare").step(validate))
        .stage(
            Stage::new("send")
                .step(
                    Step::new("broadcast")
                        .with_kind("tron")
                        .with_max_retries(3)
                        .with_timeout(Duration::from_millis(100))
                        .handler(Broadcast { chain }),
                )
                .step(confirm),
        )
        .stage(Stage::new("compensate").step(refund))
        .hooks(TransferHooks {
            store,
            transfer_id: transfer.id.clone(),
        })
        .build()
}

/// Re-runs a transfer until it stops asking to be snoozed, the way an
/// external job queue would.
async fn process(
    transfer: &Transfer,
    chain: Arc<Chain>,
    store: Arc<SnapshotStore>,
) -> Result<Snapshot, WorkflowError> {
    loop {
        let mut workflow = build_workflow(transfer, chain.clone(), store.clone())?;
        if let Some(json) = store.load(&transfer.id) {
            workflow.restore_json(&json)?;
        }

        match workflow.run().await {
            Ok(()) if workflow.state().next_stage.is_some() => {
                info!("Transfer {} routed to compensation", transfer.id);
            }
            Ok(()) => return Ok(workflow.snapshot()),
            Err(e) => match e.snooze_delay() {
                Some(delay) => {
                    info!("Transfer {} snoozed for {:?}", transfer.id, delay);
                    tokio::time::sleep(delay).await;
                }
                None => return Err(e),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let store = Arc::new(SnapshotStore::default());

    let chain = Arc::new(Chain {
        balance: 1_000,
        ..Chain::default()
    });
    let ok = Transfer {
        id: "TX-1".to_string(),
        to: "TQn9Y2khEsLJW1ChVWFMSMeRDow5KcbLSE".to_string(),
        amount: 250,
    };
    let snapshot = process(&ok, chain.clone(), store.clone()).await?;
    info!(
        "Transfer {} sent as {} after {} broadcast attempt(s), completed flag: {}",
        ok.id,
        snapshot.get_arg_as::<String>("broadcast", "tx_hash")?,
        chain.broadcast_attempts.load(Ordering::SeqCst),
        snapshot.workflow_state.is_completed
    );

    let poor_chain = Arc::new(Chain {
        balance: 10,
        ..Chain::default()
    });
    let too_large = Transfer {
        id: "TX-2".to_string(),
        to: ok.to.clone(),
        amount: 5_000,
    };
    let snapshot = process(&too_large, poor_chain, store.clone()).await?;
    info!(
        "Transfer {} refunded: {}, failure recorded: {:?}",
        too_large.id,
        snapshot.get_arg_as::<bool>("refund", "refunded")?,
        snapshot.workflow_state.error
    );

    Ok(())
}
