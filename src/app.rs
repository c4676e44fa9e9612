//! Application state management for the pixelflow dashboard
//!
//! This module contains the dashboard state, handling keyboard input,
//! dispatching background requests, and state transitions between views.

use chrono::{DateTime, Local};
use crossterm::event::{KeyCode, KeyEvent};
use std::time::Duration;
use tracing::debug;

use crate::commands::{Context, CREDITS_KEY, JOBS_KEY};
use crate::data::{ApiClient, CreditBalance, Job};
use crate::request::{RequestHandle, RequestState};

/// Application state enum representing the current view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppState {
    /// List view showing all jobs
    JobList,
    /// Detail view for a specific job
    JobDetail(String),
}

/// Main application struct managing state and data
pub struct App {
    /// Current application state/view
    pub state: AppState,
    /// Index of currently selected job in list view
    pub selected_index: usize,
    /// Flag indicating the application should quit
    pub should_quit: bool,
    /// Flag to show help overlay
    pub show_help: bool,
    /// Flag indicating a forced refresh has been requested
    pub refresh_requested: bool,
    /// Job whose details should be fetched on the next dispatch
    pub pending_detail: Option<String>,
    /// Timestamp of last refresh dispatch
    pub last_refresh: Option<DateTime<Local>>,
    /// Shared client, cache and settings
    context: Context,
    /// Job list request
    jobs: RequestHandle<Vec<Job>>,
    /// Credit balance request
    credits: RequestHandle<CreditBalance>,
    /// Single-job request; uncached so switching jobs supersedes the fetch
    job_detail: RequestHandle<Job>,
}

impl App {
    /// Creates a new App from the shared context
    pub fn new(context: Context) -> Self {
        let jobs = context.handle(Some(JOBS_KEY));
        let credits = context.handle(Some(CREDITS_KEY));
        let job_detail = context.handle(None);
        Self {
            state: AppState::JobList,
            selected_index: 0,
            should_quit: false,
            show_help: false,
            refresh_requested: false,
            pending_detail: None,
            last_refresh: None,
            context,
            jobs,
            credits,
            job_detail,
        }
    }

    pub fn jobs_state(&self) -> RequestState<Vec<Job>> {
        self.jobs.state()
    }

    pub fn credits_state(&self) -> RequestState<CreditBalance> {
        self.credits.state()
    }

    pub fn detail_state(&self) -> RequestState<Job> {
        self.job_detail.state()
    }

    /// When the job list currently shown was fetched
    pub fn jobs_cached_at(&self) -> Option<DateTime<Local>> {
        self.context
            .cache
            .cached_at(JOBS_KEY)
            .map(|at| at.with_timezone(&Local))
    }

    /// Returns the number of jobs loaded so far
    pub fn job_count(&self) -> usize {
        self.jobs.state().data.map_or(0, |jobs| jobs.len())
    }

    /// Returns the currently selected job, if any
    pub fn selected_job(&self) -> Option<Job> {
        self.jobs
            .state()
            .data
            .and_then(|jobs| jobs.into_iter().nth(self.selected_index))
    }

    /// Starts fetching jobs and credits in the background
    ///
    /// With `force`, cached responses are dropped first so the request always
    /// reaches the server.
    pub fn load_all_data(&mut self, force: bool) {
        spawn_request(&self.jobs, &self.context.api, force, |api| async move {
            api.list_jobs().await
        });
        spawn_request(&self.credits, &self.context.api, force, |api| async move {
            api.credit_balance().await
        });
        self.last_refresh = Some(Local::now());
    }

    /// Starts fetching details for `job_id`, superseding any earlier fetch
    pub fn load_job_detail(&mut self, job_id: String) {
        spawn_request(&self.job_detail, &self.context.api, false, move |api| {
            let job_id = job_id.clone();
            async move { api.get_job(&job_id).await }
        });
    }

    /// Performs any work requested by key handling
    pub fn dispatch_pending(&mut self) {
        if self.refresh_requested {
            self.refresh_requested = false;
            self.load_all_data(true);
        }
        if let Some(job_id) = self.pending_detail.take() {
            self.load_job_detail(job_id);
        }
    }

    /// Periodic refresh: re-requests data (served from cache while fresh)
    /// and prunes ledger keys that have been idle for `idle`
    pub fn on_refresh_tick(&mut self, idle: Duration) {
        self.context.cache.sweep(idle);
        self.load_all_data(false);
        if let AppState::JobDetail(ref job_id) = self.state {
            self.pending_detail = Some(job_id.clone());
        }
    }

    /// Handles keyboard input and updates state accordingly
    ///
    /// # Arguments
    /// * `key_event` - The keyboard event to handle
    ///
    /// # Key Bindings
    /// - `q` or `Esc` (in JobList): Quit the application
    /// - `Up`/`k`: Move selection up in list
    /// - `Down`/`j`: Move selection down in list
    /// - `Enter`: Open the selected job
    /// - `r`: Refresh, bypassing the cache
    /// - `c`: Drop cached data without refetching
    /// - `Esc` (in JobDetail): Go back to list view
    pub fn handle_key(&mut self, key_event: KeyEvent) {
        // Handle help overlay - intercepts all keys when shown
        if self.show_help {
            match key_event.code {
                KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q') => {
                    self.show_help = false;
                }
                _ => {} // Ignore other keys when help is shown
            }
            return;
        }

        match self.state {
            AppState::JobList => match key_event.code {
                KeyCode::Char('q') | KeyCode::Esc => {
                    self.should_quit = true;
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    self.move_selection_up();
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    self.move_selection_down();
                }
                KeyCode::Enter => {
                    if let Some(job) = self.selected_job() {
                        self.pending_detail = Some(job.id.clone());
                        self.state = AppState::JobDetail(job.id);
                    }
                }
                KeyCode::Char('r') => {
                    self.refresh_requested = true;
                }
                KeyCode::Char('c') => {
                    self.clear_cached_data();
                }
                KeyCode::Char('?') => {
                    self.show_help = true;
                }
                _ => {}
            },
            AppState::JobDetail(ref job_id) => match key_event.code {
                KeyCode::Char('q') => {
                    self.should_quit = true;
                }
                KeyCode::Esc => {
                    self.state = AppState::JobList;
                }
                KeyCode::Char('r') => {
                    self.pending_detail = Some(job_id.clone());
                    self.refresh_requested = true;
                }
                KeyCode::Char('c') => {
                    self.clear_cached_data();
                }
                KeyCode::Char('?') => {
                    self.show_help = true;
                }
                _ => {}
            },
        }
    }

    fn clear_cached_data(&mut self) {
        debug!("clearing cached dashboard data");
        self.jobs.clear_cache();
        self.credits.clear_cache();
    }

    /// Publishes the cached job list without touching the network
    #[cfg(test)]
    pub(crate) async fn load_cached_jobs(&self) {
        self.jobs.request(|| async { Ok(Vec::new()) }).await;
    }

    /// Publishes `job` as the detail result without touching the network
    #[cfg(test)]
    pub(crate) async fn load_detail(&self, job: Job) {
        self.job_detail
            .request(move || std::future::ready(Ok(job.clone())))
            .await;
    }

    /// Moves the selection up in the list, wrapping to bottom if at top
    fn move_selection_up(&mut self) {
        let count = self.job_count();
        if count == 0 {
            return;
        }
        if self.selected_index == 0 {
            self.selected_index = count - 1;
        } else {
            self.selected_index -= 1;
        }
    }

    /// Moves the selection down in the list, wrapping to top if at bottom
    fn move_selection_down(&mut self) {
        let count = self.job_count();
        if count == 0 {
            return;
        }
        self.selected_index = (self.selected_index + 1) % count;
    }
}

/// Spawns `handle.request` (or `retry` when forced) on the runtime
fn spawn_request<T, F, Fut>(
    handle: &RequestHandle<T>,
    api: &ApiClient,
    force: bool,
    mut call: F,
) where
    T: Clone + serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
    F: FnMut(ApiClient) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<T, crate::request::RequestError>> + Send + 'static,
{
    let handle = handle.clone();
    let api = api.clone();
    tokio::spawn(async move {
        let request_fn = || call(api.clone());
        if force {
            handle.retry(request_fn).await;
        } else {
            handle.request(request_fn).await;
        }
    });
}
