use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use log::warn;

use super::board_cache::{BoardDirectory, BoardNameCache, NameStore};
use crate::error::Result;
use crate::insights::{
    BoardMoveEvent, CurrentBoardPlacement, IssueRecord, Lifecycle, MoveKind, StatusEvent,
    StatusKind,
};

/// How a board event identifies where the issue went.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BoardAddress {
    /// Legacy column boards: a column id, sometimes with names attached.
    Column {
        column_id: Option<u64>,
        board_id: Option<u64>,
        column_name: Option<String>,
        previous_column_name: Option<String>,
    },
    /// Status-field boards: the board and status travel with the event.
    Status {
        board_id: String,
        board_name: String,
        status: Option<String>,
        previous_status: Option<String>,
    },
}

/// One raw timeline entry as delivered by either feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimelineEvent {
    Closed {
        at: DateTime<Utc>,
        actor: String,
    },
    Reopened {
        at: DateTime<Utc>,
        actor: String,
    },
    Board {
        at: DateTime<Utc>,
        actor: String,
        kind: MoveKind,
        address: BoardAddress,
    },
}

impl TimelineEvent {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::Closed { at, .. } | Self::Reopened { at, .. } | Self::Board { at, .. } => *at,
        }
    }

    /// Tie-break for equal timestamps: status changes sort before board moves.
    fn priority(&self) -> u8 {
        match self {
            Self::Closed { .. } | Self::Reopened { .. } => 0,
            Self::Board { .. } => 1,
        }
    }
}

struct Placement {
    present: bool,
    board_name: String,
    stage: String,
}

/// Rebuilds an issue's status and board histories from its raw timeline.
///
/// Events from both feeds are merged and sorted by time before they are
/// classified, so feed order does not matter. Legacy column events are
/// resolved through `cache`; a failed lookup leaves the names empty instead of
/// dropping the event.
///
/// # Errors
///
/// Only cancellation or quota exhaustion during a secondary lookup fail the
/// aggregation.
pub async fn aggregate<D, S>(
    issue: &IssueRecord,
    mut events: Vec<TimelineEvent>,
    cache: &mut BoardNameCache<S>,
    directory: &D,
) -> Result<Lifecycle>
where
    D: BoardDirectory,
    S: NameStore,
{
    events.sort_by(|a, b| a.at().cmp(&b.at()).then(a.priority().cmp(&b.priority())));
    let events: IndexSet<TimelineEvent> = events.into_iter().collect();

    let mut status_history = vec![StatusEvent {
        kind: StatusKind::Opened,
        at: issue.created_at,
        actor: issue.creator.clone(),
    }];
    let mut board_history = Vec::new();
    let mut placements: IndexMap<String, Placement> = IndexMap::new();
    let mut completer = None;

    for event in events {
        match event {
            TimelineEvent::Closed { at, actor } => {
                if completer.is_none() {
                    completer = Some(actor.clone());
                }
                status_history.push(StatusEvent {
                    kind: StatusKind::Closed,
                    at,
                    actor,
                });
            }
            TimelineEvent::Reopened { at, actor } => {
                status_history.push(StatusEvent {
                    kind: StatusKind::Reopened,
                    at,
                    actor,
                });
            }
            TimelineEvent::Board {
                at,
                actor,
                kind,
                address,
            } => {
                let event = resolve(address, at, actor, kind, cache, directory).await?;
                track_placement(&mut placements, &event);
                board_history.push(event);
            }
        }
    }

    let anomalies = status_anomalies(&status_history);
    if anomalies > 0 {
        warn!(
            "{}: {anomalies} closed/reopened event(s) out of sequence",
            issue.key()
        );
    }

    let current_placements = placements
        .into_iter()
        .filter(|(_, p)| p.present)
        .map(|(board_id, p)| CurrentBoardPlacement {
            board_id,
            board_name: p.board_name,
            stage: p.stage,
        })
        .collect();

    Ok(Lifecycle {
        status_history,
        board_history,
        current_placements,
        completer,
    })
}

async fn resolve<D, S>(
    address: BoardAddress,
    at: DateTime<Utc>,
    actor: String,
    kind: MoveKind,
    cache: &mut BoardNameCache<S>,
    directory: &D,
) -> Result<BoardMoveEvent>
where
    D: BoardDirectory,
    S: NameStore,
{
    let (board_id, board_name, current, previous) = match address {
        BoardAddress::Status {
            board_id,
            board_name,
            status,
            previous_status,
        } => (board_id, board_name, status, previous_status),
        BoardAddress::Column {
            column_id,
            mut board_id,
            column_name,
            previous_column_name,
        } => {
            let mut column_name = column_name.filter(|n| !n.trim().is_empty());

            if column_name.is_none() || board_id.is_none() {
                if let Some(id) = column_id {
                    if let Some(column) = cache.column(directory, id).await? {
                        column_name = column_name.or(Some(column.name));
                        board_id = board_id.or(column.board_id);
                    }
                }
            }

            let board_name = match board_id {
                Some(id) => cache
                    .board(directory, id)
                    .await?
                    .map(|b| b.name)
                    .unwrap_or_default(),
                None => String::new(),
            };

            (
                board_id.map(|id| id.to_string()).unwrap_or_default(),
                board_name,
                column_name,
                previous_column_name,
            )
        }
    };

    let current = current.unwrap_or_default();
    let previous = previous.unwrap_or_default();
    let (from_stage, to_stage) = match kind {
        MoveKind::Added => (String::new(), current),
        MoveKind::Moved => (previous, current),
        MoveKind::Removed => (current, String::new()),
    };

    Ok(BoardMoveEvent {
        board_id,
        board_name,
        from_stage,
        to_stage,
        at,
        actor,
        kind,
    })
}

fn track_placement(placements: &mut IndexMap<String, Placement>, event: &BoardMoveEvent) {
    let entry = placements
        .entry(event.board_id.clone())
        .or_insert_with(|| Placement {
            present: false,
            board_name: String::new(),
            stage: String::new(),
        });

    if !event.board_name.is_empty() {
        entry.board_name.clone_from(&event.board_name);
    }

    match event.kind {
        MoveKind::Added | MoveKind::Moved => {
            entry.present = true;
            entry.stage.clone_from(&event.to_stage);
        }
        MoveKind::Removed => entry.present = false,
    }
}

/// Counts `closed` events on an already-closed issue and `reopened` events on
/// an open one. Such sequences are kept as delivered.
fn status_anomalies(history: &[StatusEvent]) -> usize {
    let mut open = true;
    let mut anomalies = 0;
    for event in history {
        match event.kind {
            StatusKind::Opened => open = true,
            StatusKind::Closed => {
                if !open {
                    anomalies += 1;
                }
                open = false;
            }
            StatusKind::Reopened => {
                if open {
                    anomalies += 1;
                }
                open = true;
            }
        }
    }
    anomalies
}
