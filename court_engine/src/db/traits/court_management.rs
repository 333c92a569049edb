use log::*;

use crate::{
    court_api::errors::CourtError,
    db_types::{Court, MenuItem, Vendor},
};

/// Tenant resolution and catalogue lookups.
///
/// Court, vendor and menu administration happen outside the engine. The engine only reads them.
#[allow(async_fn_in_trait)]
pub trait CourtManagement: Clone {
    async fn fetch_court(&self, court_id: &str) -> Result<Option<Court>, CourtError>;

    /// Resolves the court for an inbound request.
    ///
    /// This fails closed: a court that is missing, inactive or suspended is reported as `NotFound`, and no operation
    /// may proceed without a resolved court.
    async fn resolve_court(&self, court_id: &str) -> Result<Court, CourtError> {
        match self.fetch_court(court_id).await? {
            Some(court) if court.is_active() => Ok(court),
            Some(court) => {
                debug!("🗃️ Court {court_id} is {} and cannot accept requests", court.status);
                Err(CourtError::NotFound(format!("Court {court_id}")))
            },
            None => Err(CourtError::NotFound(format!("Court {court_id}"))),
        }
    }

    async fn fetch_vendor(&self, court_id: &str, vendor_id: &str) -> Result<Option<Vendor>, CourtError>;

    async fn fetch_menu_item(&self, court_id: &str, menu_item_id: &str) -> Result<Option<MenuItem>, CourtError>;
}
