pub mod catalog_repository;
pub mod delivery_repository;
pub mod memory;
pub mod payout_repository;
pub mod ports;
pub mod seed;
pub mod subject_repository;
pub mod transaction_repository;
pub mod voucher_repository;

pub use catalog_repository::CatalogRepository;
pub use delivery_repository::DeliveryRepository;
pub use memory::{
    InMemoryCatalog, InMemoryDeliveryLog, InMemoryLedger, InMemoryPayoutStore,
    InMemorySubjectStore, InMemoryVoucherStore,
};
pub use payout_repository::PayoutRepository;
pub use ports::{CatalogStore, DeliveryLog, PayoutStore, SubjectStore, TransactionLedger, VoucherStore};
#[cfg(test)]
pub use ports::MockCatalogStore;
pub use seed::CatalogSeed;
pub use subject_repository::SubjectRepository;
pub use transaction_repository::TransactionRepository;
pub use voucher_repository::VoucherRepository;

use sqlx::PgPool;
use std::sync::Arc;

/// Database connection pool type alias.
pub type DbPool = PgPool;

/// The full set of stores the services run against.
#[derive(Clone)]
pub struct Stores {
    pub ledger: Arc<dyn TransactionLedger>,
    pub subjects: Arc<dyn SubjectStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub vouchers: Arc<dyn VoucherStore>,
    pub payouts: Arc<dyn PayoutStore>,
    pub deliveries: Arc<dyn DeliveryLog>,
}

impl Stores {
    pub fn postgres(pool: DbPool) -> Self {
        Self {
            ledger: Arc::new(TransactionRepository::new(pool.clone())),
            subjects: Arc::new(SubjectRepository::new(pool.clone())),
            catalog: Arc::new(CatalogRepository::new(pool.clone())),
            vouchers: Arc::new(VoucherRepository::new(pool.clone())),
            payouts: Arc::new(PayoutRepository::new(pool.clone())),
            deliveries: Arc::new(DeliveryRepository::new(pool)),
        }
    }

    /// Fresh in-memory stores with the catalog and vouchers taken from `seed`.
    pub async fn in_memory(seed: &CatalogSeed) -> Self {
        let catalog = InMemoryCatalog::new();
        let vouchers = InMemoryVoucherStore::new();
        seed.apply(&catalog, &vouchers).await;

        Self {
            ledger: Arc::new(InMemoryLedger::new()),
            subjects: Arc::new(InMemorySubjectStore::new()),
            catalog: Arc::new(catalog),
            vouchers: Arc::new(vouchers),
            payouts: Arc::new(InMemoryPayoutStore::new()),
            deliveries: Arc::new(InMemoryDeliveryLog::new()),
        }
    }
}
