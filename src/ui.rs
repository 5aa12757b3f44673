//! Interface de terminal do wiretrack: saída colorida.
//!
//! Usa a crate `console` para estilização. [`Printer`] formata processos,
//! trilhas de auditoria e a definição de workflow.

use console::Style;

use crate::error::WorkflowError;
use crate::state_machine::{ActionType, AuditEntry, LinkedDocument, ProcessView};
use crate::workflow::WorkflowDefinition;

pub struct Printer {
    // Estilo verde para sucesso e aprovações.
    green: Style,
    // Estilo vermelho para falhas e rejeições.
    red: Style,
    // Estilo amarelo para posições em andamento.
    yellow: Style,
    dim: Style,
}

impl Default for Printer {
    fn default() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }
}

impl Printer {
    /// Resumo do processo seguido da trilha de auditoria.
    pub fn process(&self, view: &ProcessView) {
        let status = if view.is_completed {
            self.green.apply_to("completed".to_string())
        } else {
            self.yellow.apply_to(format!("{} / step {}", view.stage, view.step))
        };
        println!("Process {}  {status}", view.id);
        println!(
            "  {}",
            self.dim.apply_to(format!(
                "created by {} at {}, updated {}",
                view.created_by, view.created_at, view.updated_at
            ))
        );

        if !view.documents.is_empty() {
            println!("  Documents:");
            for (stage, linked) in &view.documents {
                let refs = match linked {
                    LinkedDocument::One(doc) => format!("{}#{}", doc.kind, doc.id),
                    LinkedDocument::Many(docs) => docs
                        .iter()
                        .map(|d| format!("{}#{}", d.kind, d.id))
                        .collect::<Vec<_>>()
                        .join(", "),
                };
                println!("    {stage}: {refs}");
            }
        }

        println!("  Audit trail:");
        for entry in &view.audit_trail {
            println!("    {}", self.audit_line(entry));
        }
    }

    fn audit_line(&self, entry: &AuditEntry) -> String {
        let marker = match entry.action_type {
            ActionType::Start => self.yellow.apply_to("▶"),
            ActionType::Approve => self.green.apply_to("✓"),
            ActionType::Reject => self.red.apply_to("✗"),
        };
        let comment = entry
            .comment
            .as_deref()
            .map(|c| format!(" - {c}"))
            .unwrap_or_default();
        format!(
            "{marker} {} {} {}/{} → {}/{} by {}{comment}",
            self.dim.apply_to(entry.timestamp.format("%Y-%m-%d %H:%M:%S")),
            entry.action_type,
            entry.from_stage,
            entry.from_step,
            entry.to_stage,
            entry.to_step,
            entry.actor_id,
        )
    }

    pub fn stages(&self, definition: &WorkflowDefinition) {
        for (idx, stage) in definition.stages().iter().enumerate() {
            println!(
                "{} {}  {}",
                self.green.apply_to(idx + 1),
                stage.name,
                self.dim.apply_to(&stage.description)
            );
            for step in &stage.steps {
                let reject = step
                    .on_reject
                    .as_ref()
                    .map(|r| format!(" (reject → {})", r.target_step))
                    .unwrap_or_default();
                println!(
                    "    {}. [{}] {}{}",
                    step.step_number,
                    self.yellow.apply_to(&step.required_role),
                    step.action_description,
                    self.dim.apply_to(reject)
                );
            }
        }
    }

    pub fn success(&self, message: &str) {
        println!("  {} {message}", self.green.apply_to("✓"));
    }

    pub fn error(&self, err: &WorkflowError) {
        eprintln!(
            "  {} [{}] {}",
            self.red.apply_to("✗"),
            err.status_code(),
            err.public_message()
        );
    }
}
