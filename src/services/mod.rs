pub mod activation_service;
pub mod callback_correlator;
pub mod checkout_service;
pub mod effects;
pub mod payout_service;
pub mod status_service;
pub mod timeout_monitor;
pub mod voucher_service;

pub use activation_service::{Activation, ActivationService, ActivationSource};
pub use callback_correlator::CallbackCorrelator;
pub use checkout_service::{ActivationRequest, CheckoutService, CheckoutStarted};
pub use effects::{best_effort, EffectOutcome};
pub use payout_service::PayoutService;
pub use status_service::{StatusProjector, TransactionStatus};
pub use timeout_monitor::TimeoutMonitor;
pub use voucher_service::{Redemption, VoucherService};

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::appliance::ApplianceProvisioner;
use crate::config::ActivationSettings;
use crate::gateway::PaymentGateway;
use crate::repositories::Stores;

/// Every service the HTTP layer and background jobs need, wired over one set of stores.
#[derive(Clone)]
pub struct Services {
    pub checkout: Arc<CheckoutService>,
    pub correlator: Arc<CallbackCorrelator>,
    pub status: Arc<StatusProjector>,
    pub vouchers: Arc<VoucherService>,
    pub monitor: Arc<TimeoutMonitor>,
}

impl Services {
    pub fn new(
        stores: Stores,
        gateway: Arc<dyn PaymentGateway>,
        provisioner: Arc<dyn ApplianceProvisioner>,
        activation_settings: &ActivationSettings,
        default_share_percent: Decimal,
    ) -> Self {
        let payouts = Arc::new(PayoutService::new(stores.clone(), gateway.clone(), default_share_percent));
        let activation = Arc::new(ActivationService::new(
            stores.clone(),
            provisioner,
            payouts.clone(),
            activation_settings,
        ));
        let correlator = Arc::new(CallbackCorrelator::new(stores.clone(), activation.clone(), payouts));
        let monitor = Arc::new(TimeoutMonitor::new(
            stores.ledger.clone(),
            gateway.clone(),
            correlator.clone(),
            activation_settings,
        ));

        Self {
            checkout: Arc::new(CheckoutService::new(
                stores.clone(),
                gateway,
                correlator.clone(),
                monitor.clone(),
            )),
            correlator,
            status: Arc::new(StatusProjector::new(stores.ledger.clone())),
            vouchers: Arc::new(VoucherService::new(stores, activation)),
            monitor,
        }
    }
}
