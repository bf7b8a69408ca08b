// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for handling socket I/O.
//!
//! Accepts connections and spawns a task per connection. Each connection
//! carries one request; `Subscribe` keeps the connection open and streams
//! event frames until the Session ends or the subscriber stops draining.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use forge_core::{
    CoreError, Draft, DraftId, ErrorKind, Event, EventRecord, PageRequest, RepositoryId,
    RepositoryIndexEntry, SessionId, SessionStatus, UuidIdGen,
};
use forge_engine::SessionFilter;
use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;
use tokio_stream::StreamExt;
use tracing::{debug, error, warn};

use crate::lifecycle::{DaemonRepository, DaemonSessionManager};
use crate::protocol::{
    self, DraftBody, Query, Request, Response, WireError, DEFAULT_TIMEOUT, PROTOCOL_VERSION,
};

/// Shared daemon context for all request handlers.
pub(crate) struct ListenCtx {
    pub manager: Arc<DaemonSessionManager>,
    pub repo: Arc<DaemonRepository>,
    pub start_time: Instant,
    pub shutdown: Arc<Notify>,
}

/// Listener task for accepting socket connections.
pub(crate) struct Listener {
    socket: UnixListener,
    ctx: Arc<ListenCtx>,
}

#[derive(Debug, Error)]
pub(crate) enum ConnectionError {
    #[error("protocol error: {0}")]
    Wire(#[from] WireError),
}

impl Listener {
    pub fn new(socket: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self { socket, ctx }
    }

    /// Run the listener loop until the daemon stops, spawning a task per
    /// connection.
    pub async fn run(self) {
        loop {
            match self.socket.accept().await {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &ctx).await {
                            match e {
                                ConnectionError::Wire(WireError::Closed) => {
                                    debug!("client disconnected")
                                }
                                ConnectionError::Wire(WireError::Timeout) => {
                                    warn!("connection timeout")
                                }
                                _ => error!("connection error: {}", e),
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, ctx: &ListenCtx) -> Result<(), ConnectionError> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let request = protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await?;

    if matches!(request, Request::Query { .. } | Request::Ping) {
        debug!(request = ?request, "received query");
    } else {
        tracing::info!(request = ?request, "received request");
    }

    if let Request::Subscribe { id, from_sequence } = request {
        return handle_subscribe(&mut writer, ctx, id, from_sequence).await;
    }

    let response = handle_request(request, ctx).await;
    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT).await?;
    Ok(())
}

async fn handle_request(request: Request, ctx: &ListenCtx) -> Response {
    match request {
        Request::Ping => Response::Pong,
        Request::Hello { version } => {
            if version != PROTOCOL_VERSION {
                warn!(client = %version, daemon = %PROTOCOL_VERSION, "version skew");
            }
            Response::Hello {
                version: PROTOCOL_VERSION.to_string(),
            }
        }
        Request::CreateTask {
            request,
            idempotency_key,
        } => match ctx.manager.create_task(*request, idempotency_key).await {
            Ok(id) => Response::SessionCreated { id: id.to_string() },
            Err(err) => Response::problem(&err),
        },
        Request::Pause { id } => lifecycle_response(ctx.manager.pause(&SessionId::new(id)).await),
        Request::Resume { id } => lifecycle_response(ctx.manager.resume(&SessionId::new(id)).await),
        Request::Stop { id } => lifecycle_response(ctx.manager.stop(&SessionId::new(id)).await),
        Request::Cancel { id } => lifecycle_response(ctx.manager.cancel(&SessionId::new(id)).await),
        Request::Subscribe { .. } => {
            // Handled before dispatch; unreachable through handle_connection.
            Response::problem(&CoreError::internal("subscribe requires a streaming connection"))
        }
        Request::Query { query } => handle_query(query, ctx),
        Request::DraftCreate { draft } => {
            let now = Utc::now();
            let record = Draft {
                id: DraftId::generate(&UuidIdGen),
                owner_scope: draft.owner_scope.clone(),
                prompt: draft.prompt.clone(),
                repo: draft.repo.clone(),
                agent: draft.agent.clone(),
                runtime: draft.runtime.clone(),
                delivery: draft.delivery.clone(),
                created_at: now,
                updated_at: now,
            };
            match ctx.repo.put_draft(record.clone()) {
                Ok(()) => Response::Draft {
                    draft: Some(Box::new(record)),
                },
                Err(err) => Response::problem(&err.into()),
            }
        }
        Request::DraftUpdate { id, draft } => handle_draft_update(ctx, &id, *draft),
        Request::DraftDelete { id } => {
            let draft_id = DraftId::new(id);
            if ctx.repo.get_draft(&draft_id).is_none() {
                return Response::problem(&CoreError::not_found(format!("draft {draft_id}")));
            }
            match ctx.repo.delete_draft(&draft_id) {
                Ok(()) => Response::Ok,
                Err(err) => Response::problem(&err.into()),
            }
        }
        Request::RepoImport {
            remote_url,
            display_name,
            default_branch,
        } => handle_repo_import(ctx, remote_url, display_name, default_branch),
        Request::Shutdown => {
            ctx.shutdown.notify_one();
            Response::ShuttingDown
        }
    }
}

fn lifecycle_response(result: Result<(), CoreError>) -> Response {
    match result {
        Ok(()) => Response::Ok,
        Err(err) => Response::problem(&err),
    }
}

fn handle_draft_update(ctx: &ListenCtx, id: &str, body: DraftBody) -> Response {
    let draft_id = DraftId::new(id);
    let Some(mut existing) = ctx.repo.get_draft(&draft_id) else {
        return Response::problem(&CoreError::not_found(format!("draft {draft_id}")));
    };
    if !body.owner_scope.is_empty() {
        existing.owner_scope = body.owner_scope;
    }
    existing.prompt = body.prompt.or(existing.prompt);
    existing.repo = body.repo.or(existing.repo);
    existing.agent = body.agent.or(existing.agent);
    existing.runtime = body.runtime.or(existing.runtime);
    existing.delivery = body.delivery.or(existing.delivery);
    existing.updated_at = Utc::now();
    match ctx.repo.put_draft(existing.clone()) {
        Ok(()) => Response::Draft {
            draft: Some(Box::new(existing)),
        },
        Err(err) => Response::problem(&err.into()),
    }
}

fn handle_repo_import(
    ctx: &ListenCtx,
    remote_url: String,
    display_name: Option<String>,
    default_branch: Option<String>,
) -> Response {
    let existing = ctx
        .repo
        .list_repository_index()
        .into_iter()
        .find(|e| e.remote_url == remote_url);
    let entry = match existing {
        Some(mut entry) => {
            if let Some(name) = display_name {
                entry.display_name = name;
            }
            if let Some(branch) = default_branch {
                entry.default_branch = branch;
            }
            entry
        }
        None => RepositoryIndexEntry {
            id: RepositoryId::generate(&UuidIdGen),
            display_name: display_name.unwrap_or_else(|| {
                remote_url
                    .trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .unwrap_or(&remote_url)
                    .trim_end_matches(".git")
                    .to_string()
            }),
            scm_provider: "git".into(),
            remote_url,
            default_branch: default_branch.unwrap_or_else(|| "main".into()),
            last_used_at: None,
        },
    };
    match ctx.repo.put_repository_index_entry(entry) {
        Ok(()) => Response::Ok,
        Err(err) => Response::problem(&err.into()),
    }
}

fn handle_query(query: Query, ctx: &ListenCtx) -> Response {
    match query {
        Query::ListSessions {
            status,
            tenant_id,
            project_id,
            page,
            per_page,
        } => {
            let status = match status {
                Some(raw) => {
                    match serde_json::from_value::<SessionStatus>(serde_json::Value::String(
                        raw.clone(),
                    )) {
                        Ok(parsed) => Some(parsed),
                        Err(_) => {
                            return Response::problem(&CoreError::validation(format!(
                                "unknown status filter `{raw}`"
                            )))
                        }
                    }
                }
                None => None,
            };
            let filter = SessionFilter {
                status,
                tenant_id,
                project_id,
            };
            let mut request = PageRequest::default();
            if let Some(page) = page {
                request.page = page;
            }
            if let Some(per_page) = per_page {
                request.per_page = per_page;
            }
            let page = ctx.manager.list_sessions(&filter, request);
            let sessions = page
                .items
                .iter()
                .filter_map(|s| ctx.manager.get_session_view(&s.id))
                .collect();
            Response::Sessions {
                sessions,
                total: page.total,
                next_page: page.next_page,
            }
        }
        Query::GetSession { id } => Response::Session {
            session: ctx
                .manager
                .get_session_view(&SessionId::new(id))
                .map(Box::new),
        },
        Query::RecentEvents { id, n } => Response::Events {
            events: ctx.manager.recent_events(&SessionId::new(id), n),
        },
        Query::ListDrafts => Response::Drafts {
            drafts: ctx.repo.list_drafts(),
        },
        Query::GetDraft { id } => Response::Draft {
            draft: ctx.repo.get_draft(&DraftId::new(id)).map(Box::new),
        },
        Query::ListRepositories => Response::Repositories {
            repositories: ctx.repo.list_repository_index(),
        },
        Query::Status => {
            let sessions = ctx
                .manager
                .list_sessions(&SessionFilter::default(), PageRequest {
                    page: 1,
                    per_page: forge_core::wire::MAX_PER_PAGE,
                });
            let active = sessions
                .items
                .iter()
                .filter(|s| !s.status.is_terminal())
                .count();
            let entries = ctx.repo.list_snapshot_entries();
            Response::Status {
                version: PROTOCOL_VERSION.to_string(),
                uptime_secs: ctx.start_time.elapsed().as_secs(),
                sessions_active: active,
                sessions_total: sessions.total as usize,
                cache_entries: entries.len(),
                cache_bytes: entries.iter().map(|e| e.size_bytes).sum(),
            }
        }
    }
}

/// Stream a Session's events. The first frame is either a synthetic
/// `status` event carrying the current state (no `from_sequence`) or the
/// backlog beginning at `from_sequence + 1`. Ends with
/// `StreamEnd` after the terminal status event; a subscriber that stops
/// draining its socket is disconnected with `BackpressureLost`.
async fn handle_subscribe<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    ctx: &ListenCtx,
    id: String,
    from_sequence: Option<u64>,
) -> Result<(), ConnectionError> {
    let session_id = SessionId::new(id);
    let Some(session) = ctx.manager.get_session(&session_id) else {
        let response = Response::problem(&CoreError::not_found(format!("session {session_id}")));
        protocol::write_response(writer, &response, DEFAULT_TIMEOUT).await?;
        return Ok(());
    };

    let stream = ctx.manager.subscribe(&session_id, from_sequence);
    tokio::pin!(stream);

    if from_sequence.is_none() {
        let head = ctx
            .repo
            .recent_events(&session_id, 1)
            .last()
            .map(|e| e.sequence)
            .unwrap_or(0);
        let now = Utc::now();
        let frame = EventRecord {
            session_id: session_id.clone(),
            sequence: head,
            ts: now,
            recorded_at: now,
            event: Event::Status {
                status: session.status,
            },
        };
        protocol::write_response(
            writer,
            &Response::Event {
                event: Box::new(frame),
            },
            DEFAULT_TIMEOUT,
        )
        .await?;
        if session.status.is_terminal() {
            protocol::write_response(writer, &Response::StreamEnd, DEFAULT_TIMEOUT).await?;
            return Ok(());
        }
    }

    while let Some(record) = stream.next().await {
        let terminal = matches!(&record.event, Event::Status { status } if status.is_terminal());
        protocol::write_response(
            writer,
            &Response::Event {
                event: Box::new(record),
            },
            DEFAULT_TIMEOUT,
        )
        .await?;
        if terminal {
            protocol::write_response(writer, &Response::StreamEnd, DEFAULT_TIMEOUT).await?;
            return Ok(());
        }
    }

    // Live channel closed without a terminal status: either the Session is
    // actually done (bus raced the final event) or this subscriber fell
    // too far behind and was dropped by the bus.
    let ended = ctx
        .manager
        .get_session(&session_id)
        .map(|s| s.status.is_terminal())
        .unwrap_or(true);
    let response = if ended {
        Response::StreamEnd
    } else {
        Response::problem(&CoreError::new(
            ErrorKind::BackpressureLost,
            "subscriber disconnected due to slow consumption",
        ))
    };
    protocol::write_response(writer, &response, DEFAULT_TIMEOUT).await?;
    Ok(())
}
