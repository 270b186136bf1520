//! Services module
//!
//! Business logic services that coordinate between routes and the repository.
//! Role checks and state-machine rules live here.

pub mod auth;
pub mod communications;
pub mod dashboard;
pub mod incidents;
pub mod preparedness;
pub mod users;
pub mod visitors;

pub use auth::{CallerResolver, HeaderCallerResolver, SessionSigner, SessionTokenResolver};
pub use communications::CommunicationsService;
pub use dashboard::DashboardService;
pub use incidents::IncidentsService;
pub use preparedness::PreparednessService;
pub use users::UsersService;
pub use visitors::VisitorsService;

use crate::database::Repository;

/// Every service, sharing one repository
#[derive(Clone)]
pub struct Services {
    pub users: UsersService,
    pub incidents: IncidentsService,
    pub visitors: VisitorsService,
    pub communications: CommunicationsService,
    pub preparedness: PreparednessService,
    pub dashboard: DashboardService,
}

impl Services {
    pub fn new(repo: Repository) -> Self {
        Self {
            users: UsersService::new(repo.clone()),
            incidents: IncidentsService::new(repo.clone()),
            visitors: VisitorsService::new(repo.clone()),
            communications: CommunicationsService::new(repo.clone()),
            preparedness: PreparednessService::new(repo.clone()),
            dashboard: DashboardService::new(repo),
        }
    }
}
