//! Interface de linha de comando do wiretrack baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] e as flags globais
//! de identidade do ator (--actor, --role, --superuser).

use clap::{Args, Parser, Subcommand};

use crate::permission::Actor;
use crate::state_machine::{DocumentKind, ProcessId};

/// wiretrack: workflow de aprovação em estágios para produção de fios.
#[derive(Debug, Parser)]
#[command(name = "wiretrack", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub actor: ActorArgs,

    /// Imprime o resultado como JSON em vez do resumo colorido.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Identidade de quem executa o comando.
#[derive(Debug, Clone, Args)]
pub struct ActorArgs {
    /// Identificador do ator.
    #[arg(long, global = true, default_value = "cli")]
    pub actor: String,

    /// Grupo (papel) do ator. Pode ser repetido.
    #[arg(long = "role", global = true)]
    pub roles: Vec<String>,

    /// Concede a capacidade de override (superusuário).
    #[arg(long, global = true, default_value_t = false)]
    pub superuser: bool,
}

impl ActorArgs {
    pub fn to_actor(&self) -> Actor {
        let mut actor = Actor::new(self.actor.clone());
        actor.is_superuser = self.superuser;
        self.roles
            .iter()
            .fold(actor, |actor, role| actor.with_role(role.clone()))
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inicia um novo processo de fabricação.
    Start,

    /// Mostra o estado atual e a trilha de auditoria de um processo.
    Show { id: ProcessId },

    /// Aprova o passo atual de um processo.
    Approve {
        id: ProcessId,

        /// Comentário opcional registrado na auditoria.
        #[arg(long)]
        comment: Option<String>,
    },

    /// Rejeita o passo atual de um processo.
    Reject {
        id: ProcessId,

        /// Motivo da rejeição.
        #[arg(long)]
        comment: Option<String>,
    },

    /// Remove definitivamente um processo e sua auditoria (somente superusuário).
    Delete { id: ProcessId },

    /// Vincula um documento externo a um estágio do processo.
    Link {
        id: ProcessId,
        stage: String,
        kind: DocumentKind,
        doc_id: u64,
    },

    /// Reproduz a trilha de auditoria e confere a posição armazenada.
    Verify { id: ProcessId },

    /// Lista os estágios e passos da definição de workflow.
    Stages,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_reject_subcommand() {
        let id = ProcessId::new();
        let id_str = id.to_string();
        let cli = Cli::parse_from([
            "wiretrack",
            "reject",
            id_str.as_str(),
            "--comment",
            "bad",
            "--actor",
            "dana",
            "--role",
            "DM",
        ]);
        match cli.command {
            Command::Reject { id: parsed, comment } => {
                assert_eq!(parsed, id);
                assert_eq!(comment.as_deref(), Some("bad"));
            }
            _ => panic!("expected Reject command"),
        }
        let actor = cli.actor.to_actor();
        assert_eq!(actor.id, "dana");
        assert!(actor.has_role("DM"));
        assert!(!actor.is_superuser);
    }

    #[test]
    fn cli_parses_repeated_roles_and_superuser() {
        let cli = Cli::parse_from([
            "wiretrack", "--role", "QC", "--role", "OP", "--superuser", "--verbose", "start",
        ]);
        assert!(cli.verbose);
        let actor = cli.actor.to_actor();
        assert!(actor.has_role("QC") && actor.has_role("OP"));
        assert!(actor.is_superuser);
        assert!(matches!(cli.command, Command::Start));
    }

    #[test]
    fn cli_parses_link_subcommand() {
        let id = ProcessId::new().to_string();
        let cli = Cli::parse_from(["wiretrack", "link", id.as_str(), "rawmaterial", "raw_material", "42"]);
        match cli.command {
            Command::Link { stage, kind, doc_id, .. } => {
                assert_eq!(stage, "rawmaterial");
                assert_eq!(kind, DocumentKind::RawMaterial);
                assert_eq!(doc_id, 42);
            }
            _ => panic!("expected Link command"),
        }
    }

    #[test]
    fn cli_rejects_bad_process_id() {
        assert!(Cli::try_parse_from(["wiretrack", "show", "nope"]).is_err());
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
