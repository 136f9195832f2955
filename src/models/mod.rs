pub mod callback;
pub mod delivery;
pub mod payment;
pub mod payout;
pub mod plan;
pub mod subject;
pub mod tenant;
pub mod voucher;

pub use callback::{Callback, PaymentOutcome, PaymentResult, PayoutOutcome, PayoutResult};
pub use delivery::{CallbackDelivery, CallbackKind, DeliveryOutcome};
pub use payment::{PaymentTransaction, Resolution, TransactionState, TransactionStateMachine};
pub use payout::{beneficiary_share, PayoutAttempt, PayoutResolution, PayoutState};
pub use plan::Plan;
pub use subject::Subject;
pub use tenant::{select_target, Appliance, DisbursementTarget, Tenant};
pub use voucher::Voucher;
