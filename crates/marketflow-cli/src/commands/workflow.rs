//! `marketflow workflow`: Run and validate workflow definitions.

use console::style;
use marketflow_core::models::ApprovalDecision;
use marketflow_core::workflow::StepKind;
use marketflow_core::{Orchestrator, OrchestratorEvent, RunStatus, WorkflowDefinition, WorkflowRun};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use super::print_json;

/// Reviewer name recorded for decisions made from the terminal.
const CLI_REVIEWER: &str = "cli";

/// How approval requests raised by the run are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalMode {
    /// Ask on the terminal.
    Prompt,
    /// Approve everything without asking.
    AssumeYes,
}

/// Execute the workflow in `workflow_file` and return the final run.
pub async fn execute(
    orchestrator: &Orchestrator,
    workflow_file: &str,
    input: Value,
    mode: ApprovalMode,
) -> Result<WorkflowRun, String> {
    let definition = WorkflowDefinition::from_file(workflow_file).map_err(|e| e.to_string())?;
    tracing::info!(
        "[CLI] Loaded workflow '{}' ({} step(s)) from {}",
        definition.name,
        definition.steps.len(),
        workflow_file
    );

    let mut events = orchestrator.subscribe();
    let run_id = orchestrator
        .submit(definition, input)
        .await
        .map_err(|e| e.to_string())?;

    let wait = orchestrator.wait(&run_id);
    tokio::pin!(wait);
    let mut listening = true;

    loop {
        tokio::select! {
            run = &mut wait => return run.map_err(|e| e.to_string()),
            event = events.recv(), if listening => match event {
                Ok(OrchestratorEvent::ApprovalRequested { run_id: id, step_id, approvers }) if id == run_id => {
                    let decision = decide(&step_id, &approvers, mode).await?;
                    orchestrator
                        .resolve_approval(&run_id, &step_id, decision)
                        .map_err(|e| e.to_string())?;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("[CLI] Event stream lagged, skipped {} event(s)", skipped);
                }
                Err(RecvError::Closed) => listening = false,
            },
        }
    }
}

async fn decide(step_id: &str, approvers: &[String], mode: ApprovalMode) -> Result<ApprovalDecision, String> {
    if mode == ApprovalMode::AssumeYes {
        return Ok(ApprovalDecision::approve(CLI_REVIEWER));
    }

    let prompt = if approvers.is_empty() {
        format!("Approve step '{}'?", step_id)
    } else {
        format!("Approve step '{}' (approvers: {})?", step_id, approvers.join(", "))
    };
    let approved = tokio::task::spawn_blocking(move || {
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
    })
    .await
    .map_err(|e| format!("Approval prompt failed: {}", e))?
    .map_err(|e| format!("Approval prompt failed: {}", e))?;

    Ok(if approved {
        ApprovalDecision::approve(CLI_REVIEWER)
    } else {
        ApprovalDecision::reject(CLI_REVIEWER, None)
    })
}

/// Run a workflow file, print the final run and fail unless it completed.
pub async fn run(
    orchestrator: &Orchestrator,
    workflow_file: &str,
    input: Value,
    mode: ApprovalMode,
) -> Result<(), String> {
    let run = execute(orchestrator, workflow_file, input, mode).await?;
    print_json(&serde_json::to_value(&run).map_err(|e| e.to_string())?);

    match run.status {
        RunStatus::Completed => {
            eprintln!(
                "{} Workflow '{}' completed in {}ms",
                style("✔").green(),
                run.definition.name,
                run.execution_time_ms.unwrap_or_default()
            );
            Ok(())
        }
        status => Err(format!(
            "Workflow '{}' {}: {}",
            run.definition.name,
            status,
            run.error.as_deref().unwrap_or("no error recorded")
        )),
    }
}

/// Validate a workflow file without executing it.
pub async fn validate(workflow_file: &str) -> Result<(), String> {
    let workflow = WorkflowDefinition::from_file(workflow_file).map_err(|e| e.to_string())?;
    workflow.validate().map_err(|e| e.to_string())?;

    println!("{} Workflow '{}' is valid", style("✔").green(), workflow.name);
    println!("   Id: {}", workflow.id);
    println!("   Trigger: {:?}", workflow.trigger.trigger_type);
    println!("   Steps: {}", workflow.steps.len());

    for (i, step) in workflow.steps.iter().enumerate() {
        let detail = match &step.kind {
            StepKind::Agent(cfg) => format!("{}.{}", cfg.agent_id, cfg.tool),
            StepKind::Delay(cfg) => format!("{}ms", cfg.duration_ms),
            StepKind::Condition(cfg) => cfg.condition.clone().unwrap_or_default(),
            StepKind::Action(cfg) => cfg.action.clone(),
            StepKind::Approval(cfg) => cfg.approvers.join(", "),
        };
        println!("   {}. {} [{}] {}", i + 1, step.id, step.step_type(), detail);
    }

    Ok(())
}
