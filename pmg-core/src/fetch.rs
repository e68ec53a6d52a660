//! Fetch: compare local and remote latest-commit timestamps.
//!
//! Advisory only. The report recommends a push or a pull; acting on it is
//! the caller's decision.

use crate::config::RepositoryIdentity;
use crate::error::Result;
use crate::prompt::Prompt;
use crate::pull::{PullReport, pull};
use crate::push::{PushEngine, PushReport};
use crate::remote::{Remote, RemoteHead};
use crate::store::MetadataStore;
use crate::workspace::Workspace;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Divergence {
    LocalAhead,
    RemoteAhead,
    UpToDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    Push,
    Pull,
    Nothing,
}

impl Divergence {
    pub fn recommendation(self) -> Recommendation {
        match self {
            Divergence::LocalAhead => Recommendation::Push,
            Divergence::RemoteAhead => Recommendation::Pull,
            Divergence::UpToDate => Recommendation::Nothing,
        }
    }
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Divergence::LocalAhead => "local ahead",
            Divergence::RemoteAhead => "remote ahead",
            Divergence::UpToDate => "up to date",
        };
        f.write_str(s)
    }
}

/// Three-way comparison of latest-commit timestamps.
///
/// A side with no commits is behind any side that has one.
pub fn compare(local: Option<i64>, remote: Option<i64>) -> Divergence {
    match (local, remote) {
        (Some(l), Some(r)) => match l.cmp(&r) {
            Ordering::Greater => Divergence::LocalAhead,
            Ordering::Less => Divergence::RemoteAhead,
            Ordering::Equal => Divergence::UpToDate,
        },
        (None, Some(_)) => Divergence::RemoteAhead,
        (Some(_), None) => Divergence::LocalAhead,
        (None, None) => Divergence::UpToDate,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalHead {
    pub commit_id: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct FetchReport {
    pub local: Option<LocalHead>,
    pub remote: RemoteHead,
    pub divergence: Divergence,
}

impl FetchReport {
    pub fn recommendation(&self) -> Recommendation {
        self.divergence.recommendation()
    }

    /// No local history while the remote has some.
    pub fn is_initial_clone(&self) -> bool {
        self.local.is_none() && self.remote.has_commit()
    }

    /// Confirmation question for the recommended action, if there is one.
    pub fn question(&self) -> Option<&'static str> {
        match self.recommendation() {
            Recommendation::Nothing => None,
            Recommendation::Push => Some("Local changes are ahead. Push now?"),
            Recommendation::Pull if self.is_initial_clone() => {
                Some("The server has commits and this tree has none. Pull now?")
            }
            Recommendation::Pull => Some("The server is ahead. Pull now?"),
        }
    }
}

/// What acting on a fetch report did.
#[derive(Debug)]
pub enum FollowUpOutcome {
    UpToDate,
    Declined(Recommendation),
    Pushed(PushReport),
    Pulled(PullReport),
}

/// Runs the push or pull a [`FetchReport`] recommends, after confirmation.
pub struct FollowUp<'a> {
    workspace: &'a Workspace,
    store: &'a MetadataStore,
    remote: &'a dyn Remote,
    repo: &'a RepositoryIdentity,
    push_concurrency: usize,
    assume_yes: bool,
}

impl<'a> FollowUp<'a> {
    pub fn new(
        workspace: &'a Workspace,
        store: &'a MetadataStore,
        remote: &'a dyn Remote,
        repo: &'a RepositoryIdentity,
    ) -> Self {
        Self { workspace, store, remote, repo, push_concurrency: 1, assume_yes: false }
    }

    pub fn with_push_concurrency(mut self, concurrency: usize) -> Self {
        self.push_concurrency = concurrency.max(1);
        self
    }

    /// Skip the confirmation question.
    pub fn assume_yes(mut self, yes: bool) -> Self {
        self.assume_yes = yes;
        self
    }

    pub async fn run(&self, report: &FetchReport, prompt: &mut dyn Prompt) -> Result<FollowUpOutcome> {
        let recommendation = report.recommendation();
        let Some(question) = report.question() else {
            return Ok(FollowUpOutcome::UpToDate);
        };
        if !self.assume_yes && !prompt.confirm(question)? {
            tracing::info!("Declined to {:?} after fetch", recommendation);
            return Ok(FollowUpOutcome::Declined(recommendation));
        }

        match recommendation {
            Recommendation::Push => {
                let report = PushEngine::new(self.workspace, self.store, self.remote, self.repo)
                    .with_concurrency(self.push_concurrency)
                    .push(None)
                    .await?;
                Ok(FollowUpOutcome::Pushed(report))
            }
            Recommendation::Pull => {
                let report = pull(self.workspace, self.remote, self.repo).await?;
                Ok(FollowUpOutcome::Pulled(report))
            }
            Recommendation::Nothing => Ok(FollowUpOutcome::UpToDate),
        }
    }
}

pub async fn fetch(
    store: &MetadataStore,
    remote: &dyn Remote,
    repo: &RepositoryIdentity,
) -> Result<FetchReport> {
    tracing::info!("Fetching latest commit of {}", repo);
    let remote_head = remote.fetch_head(repo).await?;
    let local = store.latest_record_overall()?.map(|r| LocalHead {
        commit_id: r.commit_id,
        timestamp: r.timestamp,
    });

    let divergence = compare(local.as_ref().map(|l| l.timestamp), remote_head.timestamp);
    tracing::info!(
        "Local {:?} vs remote {:?}: {}",
        local.as_ref().map(|l| l.timestamp),
        remote_head.timestamp,
        divergence
    );
    Ok(FetchReport { local, remote: remote_head, divergence })
}
