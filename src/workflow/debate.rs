//! Debate round engine.
//!
//! A debate runs an initial round where every debater states a position,
//! then a cross-review round where each debater reviews the others, and
//! finally a synthesis package that aggregates both. The phase is derived
//! from the round sequence and the synthesized marker; it is never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::ident::validate_id;
use crate::core::keyed::{self, Keyed};
use crate::error::{Error, Result};
use crate::workflow::engine::{ModeDetail, ModeEngine};
use crate::workflow::types::{Mode, Progress, ProjectStatus};

pub const INITIAL_INSTRUCTION: &str = "Provide your position and supporting reasoning.";

pub const REVIEW_INSTRUCTION: &str = "Review the other responses. Do you agree or disagree? \
     What did they miss? Update your position if needed.";

pub const SYNTHESIS_INSTRUCTION: &str = "Synthesize the strongest points, resolve \
     disagreements, and produce a final recommendation.";

const NO_ROLE: &str = "no role specified";

/// Kind of a debate round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoundType {
    Initial,
    CrossReview,
    Synthesis,
}

impl RoundType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundType::Initial => "initial",
            RoundType::CrossReview => "cross-review",
            RoundType::Synthesis => "synthesis",
        }
    }

    /// The step that follows a finished round of this type.
    pub fn next(&self) -> Option<RoundType> {
        match self {
            RoundType::Initial => Some(RoundType::CrossReview),
            RoundType::CrossReview => Some(RoundType::Synthesis),
            RoundType::Synthesis => None,
        }
    }
}

impl std::fmt::Display for RoundType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RoundStatus {
    #[default]
    Pending,
    InProgress,
    Done,
}

/// Position of a debate in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebatePhase {
    NotStarted,
    InitialInProgress,
    InitialDone,
    CrossReviewInProgress,
    CrossReviewDone,
    Synthesized,
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DebatePhase::NotStarted => "NOT_STARTED",
            DebatePhase::InitialInProgress => "INITIAL_IN_PROGRESS",
            DebatePhase::InitialDone => "INITIAL_DONE",
            DebatePhase::CrossReviewInProgress => "CROSS_REVIEW_IN_PROGRESS",
            DebatePhase::CrossReviewDone => "CROSS_REVIEW_DONE",
            DebatePhase::Synthesized => "SYNTHESIZED",
        };
        write!(f, "{}", name)
    }
}

/// One submitted response, kept on the debater for history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebaterResponse {
    /// 1-based round number.
    pub round: usize,
    #[serde(rename = "type")]
    pub round_type: RoundType,
    pub response: String,
    pub time: DateTime<Utc>,
}

/// A debate participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debater {
    #[serde(skip)]
    pub agent_id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub responses: Vec<DebaterResponse>,
}

impl Debater {
    pub fn new(agent_id: &str, role: Option<&str>) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            role: role.unwrap_or_default().to_string(),
            responses: Vec::new(),
        }
    }

    /// Role for display, with a placeholder when none was given.
    pub fn role_label(&self) -> &str {
        if self.role.is_empty() {
            NO_ROLE
        } else {
            &self.role
        }
    }

    /// Record a response, replacing an earlier one for the same round.
    fn record(&mut self, round: usize, round_type: RoundType, response: &str) {
        let entry = DebaterResponse {
            round,
            round_type,
            response: response.to_string(),
            time: Utc::now(),
        };
        match self
            .responses
            .iter_mut()
            .find(|r| r.round == round && r.round_type == round_type)
        {
            Some(existing) => *existing = entry,
            None => self.responses.push(entry),
        }
    }
}

impl Keyed for Debater {
    fn key(&self) -> &str {
        &self.agent_id
    }

    fn set_key(&mut self, key: String) {
        self.agent_id = key;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    #[serde(rename = "type")]
    pub round_type: RoundType,
    #[serde(default)]
    pub status: RoundStatus,
    /// Debater id to response text. One entry per debater.
    #[serde(default)]
    pub responses: BTreeMap<String, String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Round {
    fn started(round_type: RoundType) -> Self {
        Self {
            round_type,
            status: RoundStatus::InProgress,
            responses: BTreeMap::new(),
            started_at: Some(Utc::now()),
            completed_at: None,
        }
    }
}

/// Initial-round dispatch payload for one debater.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebatePrompt {
    pub agent_id: String,
    pub role: String,
    pub goal: String,
    pub instruction: String,
}

/// Another debater's initial response, as shown to a reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerResponse {
    pub agent_id: String,
    pub role: String,
    pub response: String,
}

/// Cross-review dispatch payload for one debater.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossReviewPrompt {
    pub agent_id: String,
    pub role: String,
    pub own_response: String,
    /// Every other debater's response; empty with a single debater.
    pub peers: Vec<PeerResponse>,
    pub instruction: String,
}

/// Outcome of collecting one response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectOutcome {
    pub agent_id: String,
    /// 1-based round number.
    pub round: usize,
    pub round_type: RoundType,
    pub complete: bool,
    /// Debaters that have not responded yet, in roster order.
    pub missing: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<RoundType>,
}

/// One debater's contributions in a synthesis package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisEntry {
    pub agent_id: String,
    pub role: String,
    /// Response text per round type.
    pub responses: BTreeMap<String, String>,
}

/// Read-only aggregation handed to whoever writes the final answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisPackage {
    pub goal: String,
    pub debaters: Vec<SynthesisEntry>,
    pub instruction: String,
}

/// A reopened round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReopenOutcome {
    pub round: usize,
    pub round_type: RoundType,
    pub responses: usize,
}

/// Debate state: roster, rounds and synthesized marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Debate {
    #[serde(with = "keyed", default)]
    debaters: Vec<Debater>,
    #[serde(default)]
    rounds: Vec<Round>,
    /// Number of rounds started.
    #[serde(default)]
    current_round: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    synthesized_at: Option<DateTime<Utc>>,
}

impl Debate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debaters(&self) -> &[Debater] {
        &self.debaters
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    pub fn current_round(&self) -> usize {
        self.current_round
    }

    pub fn synthesized_at(&self) -> Option<DateTime<Utc>> {
        self.synthesized_at
    }

    pub fn debater(&self, agent_id: &str) -> Option<&Debater> {
        self.debaters.iter().find(|d| d.agent_id == agent_id)
    }

    pub fn phase(&self) -> DebatePhase {
        if self.synthesized_at.is_some() {
            return DebatePhase::Synthesized;
        }
        match self.rounds.as_slice() {
            [] => DebatePhase::NotStarted,
            [initial] if initial.status == RoundStatus::Done => DebatePhase::InitialDone,
            [_] => DebatePhase::InitialInProgress,
            [.., cross] if cross.status == RoundStatus::Done => DebatePhase::CrossReviewDone,
            [..] => DebatePhase::CrossReviewInProgress,
        }
    }

    /// Enroll a debater. Only allowed before the first round starts.
    pub fn add_debater(&mut self, agent_id: &str, role: Option<&str>) -> Result<()> {
        validate_id("debater", agent_id)?;
        if self.phase() != DebatePhase::NotStarted {
            return Err(Error::DebatersLocked(agent_id.to_string()));
        }
        if self.debater(agent_id).is_some() {
            return Err(Error::DebaterExists(agent_id.to_string()));
        }
        self.debaters.push(Debater::new(agent_id, role));
        Ok(())
    }

    /// Open the initial round and return one prompt per debater.
    ///
    /// # Errors
    ///
    /// `RoundInProgress` or `RoundNotReady` once the debate has started,
    /// `Validation` when no debater is enrolled.
    pub fn start(&mut self, goal: &str) -> Result<Vec<DebatePrompt>> {
        match self.phase() {
            DebatePhase::NotStarted => {}
            DebatePhase::InitialInProgress | DebatePhase::CrossReviewInProgress => {
                return Err(Error::RoundInProgress(
                    "the initial round has already started".to_string(),
                ))
            }
            _ => {
                return Err(Error::RoundNotReady(
                    "the debate has already moved past the initial round".to_string(),
                ))
            }
        }
        if self.debaters.is_empty() {
            return Err(Error::Validation(
                "add at least one debater before starting a round".to_string(),
            ));
        }

        self.rounds.push(Round::started(RoundType::Initial));
        self.current_round = self.rounds.len();

        Ok(self
            .debaters
            .iter()
            .map(|d| DebatePrompt {
                agent_id: d.agent_id.clone(),
                role: d.role_label().to_string(),
                goal: goal.to_string(),
                instruction: INITIAL_INSTRUCTION.to_string(),
            })
            .collect())
    }

    /// Record a debater's response in the open round.
    ///
    /// The last response per debater wins. The round closes by itself once
    /// every enrolled debater has responded.
    pub fn collect(&mut self, agent_id: &str, response: &str) -> Result<CollectOutcome> {
        let Some(index) = self.rounds.len().checked_sub(1) else {
            return Err(Error::RoundNotReady(
                "no round has started; run 'round start' first".to_string(),
            ));
        };
        let round_number = index + 1;
        let round_type = self.rounds[index].round_type;
        if self.rounds[index].status != RoundStatus::InProgress {
            return Err(Error::RoundNotReady(format!(
                "round {} ({}) is not accepting responses; reopen it to revise",
                round_number, round_type
            )));
        }
        let debater = self
            .debaters
            .iter_mut()
            .find(|d| d.agent_id == agent_id)
            .ok_or_else(|| Error::UnknownDebater(agent_id.to_string()))?;
        debater.record(round_number, round_type, response);

        let round = &mut self.rounds[index];
        round
            .responses
            .insert(agent_id.to_string(), response.to_string());
        let missing: Vec<String> = self
            .debaters
            .iter()
            .filter(|d| !round.responses.contains_key(&d.agent_id))
            .map(|d| d.agent_id.clone())
            .collect();
        let complete = missing.is_empty();
        if complete {
            round.status = RoundStatus::Done;
            round.completed_at = Some(Utc::now());
        }

        Ok(CollectOutcome {
            agent_id: agent_id.to_string(),
            round: round_number,
            round_type,
            complete,
            missing,
            next: if complete { round_type.next() } else { None },
        })
    }

    /// Open the cross-review round and return one review prompt per debater.
    pub fn cross_review(&mut self) -> Result<Vec<CrossReviewPrompt>> {
        match self.phase() {
            DebatePhase::InitialDone => {}
            DebatePhase::CrossReviewInProgress => {
                return Err(Error::RoundInProgress(
                    "the cross-review round has already started".to_string(),
                ))
            }
            DebatePhase::NotStarted | DebatePhase::InitialInProgress => {
                return Err(Error::RoundNotReady(
                    "complete the initial round before cross-review".to_string(),
                ))
            }
            DebatePhase::CrossReviewDone | DebatePhase::Synthesized => {
                return Err(Error::RoundNotReady(
                    "the cross-review round is already complete".to_string(),
                ))
            }
        }

        self.rounds.push(Round::started(RoundType::CrossReview));
        self.current_round = self.rounds.len();

        let initial = &self.rounds[0].responses;
        let response_of = |id: &str| initial.get(id).cloned().unwrap_or_default();
        Ok(self
            .debaters
            .iter()
            .map(|d| CrossReviewPrompt {
                agent_id: d.agent_id.clone(),
                role: d.role_label().to_string(),
                own_response: response_of(&d.agent_id),
                peers: self
                    .debaters
                    .iter()
                    .filter(|peer| peer.agent_id != d.agent_id)
                    .map(|peer| PeerResponse {
                        agent_id: peer.agent_id.clone(),
                        role: peer.role_label().to_string(),
                        response: response_of(&peer.agent_id),
                    })
                    .collect(),
                instruction: REVIEW_INSTRUCTION.to_string(),
            })
            .collect())
    }

    /// Aggregate every round's responses and mark the debate synthesized.
    ///
    /// Calling it again after synthesis returns the same package and keeps
    /// the original synthesis time.
    pub fn synthesize(&mut self, goal: &str) -> Result<SynthesisPackage> {
        match self.phase() {
            DebatePhase::CrossReviewDone | DebatePhase::Synthesized => {}
            DebatePhase::CrossReviewInProgress => {
                return Err(Error::RoundInProgress(
                    "the cross-review round is still collecting responses".to_string(),
                ))
            }
            _ => {
                return Err(Error::RoundNotReady(
                    "complete the cross-review round before synthesis".to_string(),
                ))
            }
        }
        if self.synthesized_at.is_none() {
            self.synthesized_at = Some(Utc::now());
        }
        Ok(self.package(goal))
    }

    fn package(&self, goal: &str) -> SynthesisPackage {
        let debaters = self
            .debaters
            .iter()
            .map(|d| SynthesisEntry {
                agent_id: d.agent_id.clone(),
                role: d.role_label().to_string(),
                responses: self
                    .rounds
                    .iter()
                    .filter_map(|round| {
                        round
                            .responses
                            .get(&d.agent_id)
                            .map(|text| (round.round_type.to_string(), text.clone()))
                    })
                    .collect(),
            })
            .collect();

        SynthesisPackage {
            goal: goal.to_string(),
            debaters,
            instruction: SYNTHESIS_INSTRUCTION.to_string(),
        }
    }

    /// Put the latest round back in progress so responses can be revised.
    ///
    /// Existing responses are kept and later collects overwrite them. The
    /// synthesized marker is cleared.
    pub fn reopen(&mut self) -> Result<ReopenOutcome> {
        let round_number = self.rounds.len();
        let round = self.rounds.last_mut().ok_or_else(|| {
            Error::RoundNotReady("no round has started; nothing to reopen".to_string())
        })?;
        round.status = RoundStatus::InProgress;
        round.completed_at = None;
        self.synthesized_at = None;

        Ok(ReopenOutcome {
            round: round_number,
            round_type: round.round_type,
            responses: round.responses.len(),
        })
    }

    /// What the debate needs next, none once synthesized.
    pub fn next_round(&self) -> Option<RoundType> {
        match self.phase() {
            DebatePhase::NotStarted | DebatePhase::InitialInProgress => Some(RoundType::Initial),
            DebatePhase::InitialDone | DebatePhase::CrossReviewInProgress => {
                Some(RoundType::CrossReview)
            }
            DebatePhase::CrossReviewDone => Some(RoundType::Synthesis),
            DebatePhase::Synthesized => None,
        }
    }
}

impl ModeEngine for Debate {
    fn mode(&self) -> Mode {
        Mode::Debate
    }

    fn derive_status(&self) -> ProjectStatus {
        if self.phase() == DebatePhase::Synthesized {
            ProjectStatus::Completed
        } else {
            ProjectStatus::Active
        }
    }

    /// Steps are the initial round, the cross-review round and synthesis.
    fn progress(&self) -> Progress {
        let rounds_done = self
            .rounds
            .iter()
            .filter(|r| r.status == RoundStatus::Done)
            .count();
        let synthesized = usize::from(self.synthesized_at.is_some());
        Progress::new(rounds_done + synthesized, 3)
    }

    fn detail(&self) -> ModeDetail {
        ModeDetail {
            phase: Some(self.phase()),
            next_round: self.next_round(),
            ..ModeDetail::default()
        }
    }
}
