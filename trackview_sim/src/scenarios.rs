//! Deterministic scenarios for the route and playback engines.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// TV-001: Healthy router, moving tracker
    Commute,

    /// TV-002: Each travel mode fails 30% of the time
    FlakyRouter,

    /// TV-003: Router down for the whole run
    RouterOutage,

    /// TV-004: Tracker never leaves its parking spot
    Parked,

    /// TV-005: New page arrives while a resolution is in flight
    Supersede,

    /// TV-006: Dashboard torn down mid-resolution
    Teardown,

    /// TV-007: Backend fails after the first page
    BackendDown,

    /// TV-008: Page arrives newest-first and shuffled
    ShuffledPage,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Commute,
            ScenarioId::FlakyRouter,
            ScenarioId::RouterOutage,
            ScenarioId::Parked,
            ScenarioId::Supersede,
            ScenarioId::Teardown,
            ScenarioId::BackendDown,
            ScenarioId::ShuffledPage,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Commute => "commute",
            ScenarioId::FlakyRouter => "flaky_router",
            ScenarioId::RouterOutage => "router_outage",
            ScenarioId::Parked => "parked",
            ScenarioId::Supersede => "supersede",
            ScenarioId::Teardown => "teardown",
            ScenarioId::BackendDown => "backend_down",
            ScenarioId::ShuffledPage => "shuffled_page",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Commute => "Every pair routed, playback runs to the last point",
            ScenarioId::FlakyRouter => "30% failures per mode, fallback keeps every segment",
            ScenarioId::RouterOutage => "All requests fail, path is the straight-line polyline",
            ScenarioId::Parked => "All fixes within 50 m, nothing to route",
            ScenarioId::Supersede => "Stale resolution never overwrites the newer one",
            ScenarioId::Teardown => "Cancelled resolution leaves the previous path in place",
            ScenarioId::BackendDown => "Fetch error surfaced, rows and route retained",
            ScenarioId::ShuffledPage => "Out-of-order rows resolve like sorted rows",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "commute" | "tv-001" => Ok(ScenarioId::Commute),
            "flaky_router" | "flakyrouter" | "tv-002" => Ok(ScenarioId::FlakyRouter),
            "router_outage" | "routeroutage" | "tv-003" => Ok(ScenarioId::RouterOutage),
            "parked" | "tv-004" => Ok(ScenarioId::Parked),
            "supersede" | "tv-005" => Ok(ScenarioId::Supersede),
            "teardown" | "tv-006" => Ok(ScenarioId::Teardown),
            "backend_down" | "backenddown" | "tv-007" => Ok(ScenarioId::BackendDown),
            "shuffled_page" | "shuffledpage" | "tv-008" => Ok(ScenarioId::ShuffledPage),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
