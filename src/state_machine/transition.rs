use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::process::{ActionType, AuditEntry, Position};
use crate::error::{Result, WorkflowError};
use crate::workflow::WorkflowDefinition;

/// What an actor asks the workflow to do at the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Approve,
    Reject,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Approve => write!(f, "approve"),
            Action::Reject => write!(f, "reject"),
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Action::Approve),
            "reject" => Ok(Action::Reject),
            other => Err(format!("Invalid action '{other}'")),
        }
    }
}

impl From<Action> for ActionType {
    fn from(action: Action) -> Self {
        match action {
            Action::Approve => ActionType::Approve,
            Action::Reject => ActionType::Reject,
        }
    }
}

/// The result of evaluating an action against the workflow graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Move forward to the next step, possibly entering the next stage.
    Advance(Position),
    /// Go back to an earlier step of the same stage after a rejection.
    RollBack(Position),
    /// The last step of the last stage was approved. Position is frozen.
    Complete(Position),
}

impl Transition {
    pub fn position(&self) -> &Position {
        match self {
            Transition::Advance(p) | Transition::RollBack(p) | Transition::Complete(p) => p,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Transition::Complete(_))
    }
}

/// Position and completion flag rebuilt from an audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replayed {
    pub position: Position,
    pub completed: bool,
}

/// Computes transitions over a [`WorkflowDefinition`].
///
/// Stateless and side-effect free: the same inputs always give the same
/// transition.
pub struct TransitionEngine;

impl TransitionEngine {
    /// Compute the transition for `action` taken at `current`.
    ///
    /// - Approve on a step that is not the stage's last moves to the next step.
    /// - Approve on a stage's last step enters step 1 of the next stage, or
    ///   completes the process when there is no next stage.
    /// - Reject requires an `on_reject` rule on the current step and, when the
    ///   rule asks for one, a non-blank comment.
    pub fn next(
        definition: &WorkflowDefinition,
        current: &Position,
        action: Action,
        comment: Option<&str>,
    ) -> Result<Transition> {
        match action {
            Action::Approve => Self::approve(definition, current),
            Action::Reject => Self::reject(definition, current, comment),
        }
    }

    fn approve(definition: &WorkflowDefinition, current: &Position) -> Result<Transition> {
        if !definition.is_last_step(&current.stage, current.step)? {
            return Ok(Transition::Advance(Position::new(
                current.stage.clone(),
                current.step + 1,
            )));
        }
        match definition.next_stage(&current.stage)? {
            Some(next) => Ok(Transition::Advance(Position::new(next, 1))),
            None => Ok(Transition::Complete(current.clone())),
        }
    }

    fn reject(
        definition: &WorkflowDefinition,
        current: &Position,
        comment: Option<&str>,
    ) -> Result<Transition> {
        let step = definition.step_config(&current.stage, current.step)?;
        let Some(rule) = &step.on_reject else {
            return Err(WorkflowError::NotRejectable {
                stage: current.stage.clone(),
                step: current.step,
            });
        };
        let blank = comment.is_none_or(|c| c.trim().is_empty());
        if rule.require_comment && blank {
            return Err(WorkflowError::CommentRequired(rule.message.clone()));
        }
        Ok(Transition::RollBack(Position::new(
            current.stage.clone(),
            rule.target_step,
        )))
    }

    /// Rebuild a process position by re-applying its audit trail from the
    /// initial state. Any entry whose recorded positions disagree with the
    /// recomputed ones is reported as a configuration error.
    pub fn replay(definition: &WorkflowDefinition, entries: &[AuditEntry]) -> Result<Replayed> {
        let initial = Position::initial(definition);
        let mut entries = entries.iter();

        match entries.next() {
            Some(start) if start.action_type == ActionType::Start => {
                if start.to_position() != initial {
                    return Err(WorkflowError::Config(format!(
                        "audit trail starts at {}, expected {initial}",
                        start.to_position()
                    )));
                }
            }
            _ => {
                return Err(WorkflowError::Config(
                    "audit trail does not begin with a start entry".into(),
                ));
            }
        }

        let mut state = Replayed {
            position: initial,
            completed: false,
        };
        for entry in entries {
            let action = match entry.action_type {
                ActionType::Approve => Action::Approve,
                ActionType::Reject => Action::Reject,
                ActionType::Start => {
                    return Err(WorkflowError::Config("audit trail has a second start entry".into()));
                }
            };
            if state.completed {
                return Err(WorkflowError::Config(
                    "audit trail continues after completion".into(),
                ));
            }
            if entry.from_position() != state.position {
                return Err(WorkflowError::Config(format!(
                    "audit entry from {} does not follow {}",
                    entry.from_position(),
                    state.position
                )));
            }
            let transition =
                Self::next(definition, &state.position, action, entry.comment.as_deref())
                    .map_err(WorkflowError::stored_position)?;
            if *transition.position() != entry.to_position() {
                return Err(WorkflowError::Config(format!(
                    "audit entry records {} but workflow yields {}",
                    entry.to_position(),
                    transition.position()
                )));
            }
            state.completed = transition.is_complete();
            state.position = transition.position().clone();
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::process::{ProcessId, ProcessInstance};
    use proptest::prelude::*;

    fn wire() -> WorkflowDefinition {
        WorkflowDefinition::wire().unwrap()
    }

    fn at(stage: &str, step: u32) -> Position {
        Position::new(stage, step)
    }

    #[test]
    fn approve_walks_steps_and_stages() {
        let def = wire();
        let mut pos = Position::initial(&def);
        for step in 2..=4 {
            let t = TransitionEngine::next(&def, &pos, Action::Approve, None).unwrap();
            assert_eq!(t, Transition::Advance(at("rawmaterial", step)));
            pos = t.position().clone();
        }
        let t = TransitionEngine::next(&def, &pos, Action::Approve, None).unwrap();
        assert_eq!(t, Transition::Advance(at("license", 1)));
    }

    #[test]
    fn approve_last_step_of_last_stage_completes() {
        let def = wire();
        let t = TransitionEngine::next(&def, &at("product", 1), Action::Approve, None).unwrap();
        assert_eq!(t, Transition::Complete(at("product", 1)));
        assert!(t.is_complete());
    }

    #[test]
    fn reject_rolls_back_within_stage() {
        let def = wire();
        let t =
            TransitionEngine::next(&def, &at("license", 2), Action::Reject, Some("bad")).unwrap();
        assert_eq!(t, Transition::RollBack(at("license", 1)));

        let t = TransitionEngine::next(&def, &at("production", 7), Action::Reject, Some("scrap"))
            .unwrap();
        assert_eq!(t, Transition::RollBack(at("production", 2)));
    }

    #[test]
    fn reject_without_rule_is_not_rejectable() {
        let def = wire();
        for pos in [at("rawmaterial", 1), at("checklist", 2), at("product", 1)] {
            let result = TransitionEngine::next(&def, &pos, Action::Reject, Some("why"));
            assert!(matches!(result, Err(WorkflowError::NotRejectable { .. })));
        }
    }

    #[test]
    fn reject_requires_comment() {
        let def = wire();
        for comment in [None, Some(""), Some("   ")] {
            let result = TransitionEngine::next(&def, &at("license", 3), Action::Reject, comment);
            assert!(matches!(
                result,
                Err(WorkflowError::CommentRequired(m)) if m == "Must provide a rejection description."
            ));
        }
    }

    #[test]
    fn unknown_position_is_reported() {
        let def = wire();
        let result = TransitionEngine::next(&def, &at("license", 9), Action::Approve, None);
        assert!(matches!(result, Err(WorkflowError::StepNotFound { .. })));
        let result = TransitionEngine::next(&def, &at("spooling", 1), Action::Approve, None);
        assert!(matches!(result, Err(WorkflowError::StageNotFound(_))));
    }

    #[test]
    fn action_parses() {
        assert_eq!("approve".parse::<Action>().unwrap(), Action::Approve);
        assert_eq!("reject".parse::<Action>().unwrap(), Action::Reject);
        assert!("skip".parse::<Action>().is_err());
        assert_eq!(ActionType::from(Action::Reject), ActionType::Reject);
    }

    fn build_trail(def: &WorkflowDefinition, actions: &[(Action, bool)]) -> (Vec<AuditEntry>, Replayed) {
        let process = ProcessInstance::new(def, "tester");
        let mut trail = vec![AuditEntry::start(&process, "tester")];
        let mut state = Replayed {
            position: process.position(),
            completed: false,
        };
        for &(action, with_comment) in actions {
            if state.completed {
                break;
            }
            let comment = with_comment.then_some("because");
            let Ok(t) = TransitionEngine::next(def, &state.position, action, comment) else {
                continue;
            };
            trail.push(AuditEntry::transition(
                process.id,
                "tester",
                action.into(),
                &state.position,
                t.position(),
                comment,
            ));
            state.completed = t.is_complete();
            state.position = t.position().clone();
        }
        (trail, state)
    }

    #[test]
    fn replay_reproduces_scenario() {
        let def = wire();
        let mut actions = vec![(Action::Approve, false); 5];
        actions.push((Action::Reject, true));
        let (trail, state) = build_trail(&def, &actions);
        assert_eq!(state.position, at("license", 1));
        assert_eq!(trail.len(), 7);
        let last = trail.last().unwrap();
        assert_eq!((last.from_step, last.to_step), (2, 1));

        assert_eq!(TransitionEngine::replay(&def, &trail).unwrap(), state);
    }

    #[test]
    fn replay_detects_tampered_entry() {
        let def = wire();
        let (mut trail, _) = build_trail(&def, &[(Action::Approve, false); 2]);
        trail[2].to_step = 4;
        assert!(matches!(
            TransitionEngine::replay(&def, &trail),
            Err(WorkflowError::Config(_))
        ));
    }

    #[test]
    fn replay_requires_start_entry() {
        let def = wire();
        assert!(TransitionEngine::replay(&def, &[]).is_err());
        let (trail, _) = build_trail(&def, &[(Action::Approve, false)]);
        assert!(TransitionEngine::replay(&def, &trail[1..]).is_err());
    }

    #[test]
    fn replay_refuses_entries_after_completion() {
        let def = wire();
        let (mut trail, state) = build_trail(&def, &[(Action::Approve, false); 23]);
        assert!(state.completed);
        let extra = AuditEntry::transition(
            ProcessId::new(),
            "tester",
            ActionType::Approve,
            &state.position,
            &state.position,
            None,
        );
        trail.push(extra);
        assert!(TransitionEngine::replay(&def, &trail).is_err());
    }

    fn any_position() -> impl Strategy<Value = Position> {
        let def = wire();
        let positions: Vec<Position> = def
            .stages()
            .iter()
            .flat_map(|s| (1..=s.step_count()).map(move |n| Position::new(s.name.clone(), n)))
            .collect();
        proptest::sample::select(positions)
    }

    proptest! {
        #[test]
        fn approve_law(pos in any_position()) {
            let def = wire();
            let stage = def.stage(&pos.stage).unwrap();
            let t = TransitionEngine::next(&def, &pos, Action::Approve, None).unwrap();
            if pos.step < stage.step_count() {
                prop_assert_eq!(t, Transition::Advance(Position::new(pos.stage.clone(), pos.step + 1)));
            } else if let Some(next) = def.next_stage(&pos.stage).unwrap() {
                prop_assert_eq!(t, Transition::Advance(Position::new(next, 1)));
            } else {
                prop_assert_eq!(t, Transition::Complete(pos.clone()));
            }
        }

        #[test]
        fn reject_never_leaves_stage(pos in any_position()) {
            let def = wire();
            match TransitionEngine::next(&def, &pos, Action::Reject, Some("no")) {
                Ok(t) => {
                    prop_assert!(!t.is_complete());
                    prop_assert_eq!(&t.position().stage, &pos.stage);
                    prop_assert!(t.position().step < pos.step);
                }
                Err(e) => prop_assert!(
                    matches!(e, WorkflowError::NotRejectable { .. }),
                    "unexpected error {:?}",
                    e
                ),
            }
        }

        #[test]
        fn replay_round_trips(actions in proptest::collection::vec((any::<bool>(), any::<bool>()), 0..60)) {
            let def = wire();
            let actions: Vec<(Action, bool)> = actions
                .into_iter()
                .map(|(approve, comment)| (if approve { Action::Approve } else { Action::Reject }, comment))
                .collect();
            let (trail, state) = build_trail(&def, &actions);
            prop_assert_eq!(TransitionEngine::replay(&def, &trail).unwrap(), state);
        }
    }
}
