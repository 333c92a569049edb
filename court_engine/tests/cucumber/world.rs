use court_engine::{
    db_types::{CourtSettings, Paise},
    test_utils::TestSystem,
    CourtError,
    InsertedOrders,
};
use cucumber::World;

#[derive(Default, Debug, World)]
pub struct CourtWorld {
    pub system: Option<TestSystem>,
    pub settings: CourtSettings,
    /// The most recent checkout, by customer
    pub checkouts: Vec<(String, InsertedOrders)>,
    pub last_error: Option<CourtError>,
}

impl CourtWorld {
    pub fn system(&self) -> &TestSystem {
        self.system.as_ref().expect("No food court has been set up")
    }

    /// Replaces any court opened earlier in the scenario, e.g. by the background.
    pub async fn open_court(&mut self, court_id: &str) {
        if let Some(previous) = self.system.take() {
            previous.teardown().await;
        }
        self.checkouts.clear();
        self.system = Some(TestSystem::new(court_id, self.settings.clone()).await);
    }

    pub fn checkout_of(&self, customer: &str) -> &InsertedOrders {
        self.checkouts
            .iter()
            .rev()
            .find(|(c, _)| c == customer)
            .map(|(_, orders)| orders)
            .unwrap_or_else(|| panic!("{customer} has not checked out"))
    }

    pub fn vendor_order_id(&self, customer: &str, vendor: &str) -> i64 {
        self.checkout_of(customer)
            .vendor_orders()
            .into_iter()
            .find(|o| o.belongs_to_vendor(vendor))
            .map(|o| o.id)
            .unwrap_or_else(|| panic!("{customer}'s checkout has no order for {vendor}"))
    }

    pub fn record<T>(&mut self, result: Result<T, CourtError>) -> Option<T> {
        match result {
            Ok(v) => {
                self.last_error = None;
                Some(v)
            },
            Err(e) => {
                self.last_error = Some(e);
                None
            },
        }
    }
}

pub fn rupees(amount: i64) -> Paise {
    Paise::from_rupees(amount)
}
