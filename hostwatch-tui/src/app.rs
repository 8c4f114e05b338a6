use anyhow::Result;
use hostwatch_core::{
    ActiveConnection, Event, EventFilter, Grant, ProcessSample, QueryService, RankBy,
    StatusSummary,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const EVENT_ROWS: u32 = 200;
const PROCESS_ROWS: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Latest,
    Events,
    Alerts,
    Processes,
    Connections,
}

impl Tab {
    pub const ALL: [Tab; 5] = [
        Tab::Latest,
        Tab::Events,
        Tab::Alerts,
        Tab::Processes,
        Tab::Connections,
    ];

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn title(self) -> &'static str {
        match self {
            Tab::Latest => "Latest (1)",
            Tab::Events => "Events (2)",
            Tab::Alerts => "Alerts (3)",
            Tab::Processes => "Processes (4)",
            Tab::Connections => "Connections (5)",
        }
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn previous(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// Everything one refresh reads from the query service.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub latest: Vec<Event>,
    pub events: Vec<Event>,
    pub alerts: Vec<Event>,
    pub summary: StatusSummary,
    pub processes: Vec<ProcessSample>,
    pub connections: Vec<ActiveConnection>,
}

impl Snapshot {
    fn collect(
        query: &QueryService,
        grant: &Grant,
        rank_by: RankBy,
    ) -> hostwatch_core::Result<Self> {
        Ok(Self {
            latest: query.latest_per_metric(grant)?,
            events: query.list_events(grant, EventFilter::new().limit(EVENT_ROWS))?,
            alerts: query.critical_alerts(grant)?,
            summary: query.summary(grant)?,
            processes: query.top_processes(grant, rank_by.as_str(), PROCESS_ROWS)?,
            connections: query.active_connections(grant)?,
        })
    }
}

pub struct App {
    query: Arc<QueryService>,
    grant: Arc<Grant>,
    pub hostname: String,
    pub data: Snapshot,
    pub current_tab: Tab,
    pub rank_by: RankBy,
    pub selected: usize,
    pub status_message: Option<String>,
    last_update: Option<Instant>,
    update_interval: Duration,
}

impl App {
    pub fn new(query: QueryService, grant: Grant, hostname: String) -> Self {
        Self {
            query: Arc::new(query),
            grant: Arc::new(grant),
            hostname,
            data: Snapshot::default(),
            current_tab: Tab::Latest,
            rank_by: RankBy::Cpu,
            selected: 0,
            status_message: None,
            last_update: None,
            update_interval: Duration::from_secs(2),
        }
    }

    /// Refresh when the interval has elapsed. A failed refresh keeps the
    /// previous data on screen and reports the error in the footer.
    pub async fn update(&mut self) -> Result<()> {
        if self
            .last_update
            .is_some_and(|at| at.elapsed() < self.update_interval)
        {
            return Ok(());
        }
        self.refresh().await
    }

    pub async fn refresh(&mut self) -> Result<()> {
        let query = self.query.clone();
        let grant = self.grant.clone();
        let rank_by = self.rank_by;
        let collected =
            tokio::task::spawn_blocking(move || Snapshot::collect(&query, &grant, rank_by)).await?;

        match collected {
            Ok(data) => {
                self.data = data;
                self.status_message = None;
                self.clamp_selection();
            }
            Err(e) => {
                tracing::warn!(error = %e, "refresh failed");
                self.status_message = Some(format!("Refresh failed: {}", e));
            }
        }
        self.last_update = Some(Instant::now());
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        match self.current_tab {
            Tab::Latest => self.data.latest.len(),
            Tab::Events => self.data.events.len(),
            Tab::Alerts => self.data.alerts.len(),
            Tab::Processes => self.data.processes.len(),
            Tab::Connections => self.data.connections.len(),
        }
    }

    pub fn next_row(&mut self) {
        let rows = self.row_count();
        if rows > 0 {
            self.selected = (self.selected + 1) % rows;
        }
    }

    pub fn previous_row(&mut self) {
        let rows = self.row_count();
        if rows > 0 {
            self.selected = (self.selected + rows - 1) % rows;
        }
    }

    pub fn page_down(&mut self, amount: usize) {
        self.selected = (self.selected + amount).min(self.row_count().saturating_sub(1));
    }

    pub fn page_up(&mut self, amount: usize) {
        self.selected = self.selected.saturating_sub(amount);
    }

    fn clamp_selection(&mut self) {
        self.selected = self.selected.min(self.row_count().saturating_sub(1));
    }

    pub fn next_tab(&mut self) {
        self.set_tab(self.current_tab.next());
    }

    pub fn previous_tab(&mut self) {
        self.set_tab(self.current_tab.previous());
    }

    pub fn set_tab(&mut self, tab: Tab) {
        if tab != self.current_tab {
            self.current_tab = tab;
            self.selected = 0;
        }
    }

    pub fn set_tab_index(&mut self, index: usize) {
        if let Some(tab) = Tab::ALL.get(index) {
            self.set_tab(*tab);
        }
    }

    /// Switch the process ranking between CPU and memory and reload now.
    pub async fn toggle_rank(&mut self) -> Result<()> {
        self.rank_by = match self.rank_by {
            RankBy::Cpu => RankBy::Memory,
            RankBy::Memory => RankBy::Cpu,
        };
        self.refresh().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tabs_cycle_in_both_directions() {
        assert_eq!(Tab::Latest.next(), Tab::Events);
        assert_eq!(Tab::Connections.next(), Tab::Latest);
        assert_eq!(Tab::Latest.previous(), Tab::Connections);
        assert_eq!(Tab::Alerts.previous(), Tab::Events);
    }

    #[test]
    fn tab_indices_match_number_keys() {
        for (i, tab) in Tab::ALL.iter().enumerate() {
            assert_eq!(tab.index(), i);
            assert!(tab.title().contains(&(i + 1).to_string()));
        }
    }
}
