//! Checkout Step Controller
//!
//! Owns the client-side [`CheckoutSession`]. Every mutation goes through a
//! setter here, is persisted to the [`SessionStore`] and only then mirrored
//! to the [`StepNavigator`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::checkout::client::CheckoutApi;
use crate::checkout::error::CheckoutError;
use crate::checkout::session::{CheckoutSession, SessionStore, StepNavigator};
use crate::checkout::step::{transition, CheckoutStep, StepEvent, StepGuards};
use crate::services::coupon::normalize_code;
use crate::types::{
    Address, AddressId, AppliedCoupon, CodEligibility, CreateOrderRequest, PaymentMethod,
};

#[derive(Default)]
struct ControllerState {
    /// `None` once torn down
    session: Option<CheckoutSession>,
    addresses: Vec<Address>,
    /// Cleared whenever the cart changes
    cod: Option<CodEligibility>,
}

impl ControllerState {
    fn session(&self) -> Result<&CheckoutSession, CheckoutError> {
        self.session.as_ref().ok_or(CheckoutError::SessionClosed)
    }

    fn session_mut(&mut self) -> Result<&mut CheckoutSession, CheckoutError> {
        self.session.as_mut().ok_or(CheckoutError::SessionClosed)
    }

    fn address_resolvable(&self) -> bool {
        match self.session.as_ref().and_then(|s| s.selected_address_id) {
            Some(id) => self.addresses.iter().any(|a| a.id == id),
            None => false,
        }
    }

    fn guards(&self) -> StepGuards {
        StepGuards {
            address_resolvable: self.address_resolvable(),
        }
    }
}

/// Exclusive right to submit; released on drop unless held
pub struct SubmitPermit {
    flag: Arc<AtomicBool>,
    held: bool,
}

impl SubmitPermit {
    /// Keep the guard locked after this permit goes away. Used once a payment
    /// may have been taken, until the flow finishes or is cancelled.
    pub fn hold(mut self) {
        self.held = true;
    }
}

impl Drop for SubmitPermit {
    fn drop(&mut self) {
        if !self.held {
            self.flag.store(false, Ordering::SeqCst);
        }
    }
}

pub struct StepController {
    api: Arc<dyn CheckoutApi>,
    store: Arc<dyn SessionStore>,
    navigator: Arc<dyn StepNavigator>,
    state: Mutex<ControllerState>,
    in_flight: Arc<AtomicBool>,
}

impl StepController {
    pub fn new(
        api: Arc<dyn CheckoutApi>,
        store: Arc<dyn SessionStore>,
        navigator: Arc<dyn StepNavigator>,
    ) -> Self {
        Self {
            api,
            store,
            navigator,
            state: Mutex::new(ControllerState::default()),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start a fresh session on the address step
    pub async fn begin(&self) -> Result<CheckoutSession, CheckoutError> {
        let addresses = self.api.addresses().await?;
        let mut state = self.state.lock().await;
        state.addresses = addresses;
        state.cod = None;

        let mut session = CheckoutSession::new();
        if let Some(default) = state.addresses.iter().find(|a| a.is_default) {
            session.selected_address_id = Some(default.id);
        }
        state.session = Some(session);
        info!("checkout session started");
        self.commit(&state).await
    }

    /// Re-hydrate from storage and the current URL, then re-validate against
    /// the live address list. Falls back to [`begin`](Self::begin) when
    /// nothing is stored.
    pub async fn restore(&self) -> Result<CheckoutSession, CheckoutError> {
        let Some(mut session) = CheckoutSession::load(self.store.as_ref()).await else {
            return self.begin().await;
        };
        let requested = self
            .navigator
            .current_step()
            .await
            .unwrap_or(CheckoutStep::Address);

        let addresses = self.api.addresses().await?;
        let mut state = self.state.lock().await;
        state.addresses = addresses;
        state.cod = None;

        if let Some(id) = session.selected_address_id {
            if !state.addresses.iter().any(|a| a.id == id) {
                warn!(address_id = %id, "stored address no longer exists");
                session.selected_address_id = None;
            }
        }
        state.session = Some(session);

        let step = transition(CheckoutStep::Address, StepEvent::Enter(requested), state.guards())
            .unwrap_or(CheckoutStep::Address);
        if step == CheckoutStep::Payment {
            self.gate_cod(&mut state).await?;
        }
        state.session_mut()?.current_step = step;
        debug!(requested = %requested, step = %step, "checkout session restored");
        self.commit(&state).await
    }

    pub async fn snapshot(&self) -> Result<CheckoutSession, CheckoutError> {
        Ok(self.state.lock().await.session()?.clone())
    }

    pub async fn addresses(&self) -> Vec<Address> {
        self.state.lock().await.addresses.clone()
    }

    /// Last COD gate result; the payment step disables COD and lists the
    /// blocking items when ineligible
    pub async fn cod_status(&self) -> Option<CodEligibility> {
        self.state.lock().await.cod.clone()
    }

    /// Reload addresses; an address that disappeared sends the customer back
    pub async fn refresh_addresses(&self) -> Result<Vec<Address>, CheckoutError> {
        let addresses = self.api.addresses().await?;
        let mut state = self.state.lock().await;
        state.addresses = addresses;
        if !state.address_resolvable() {
            let session = state.session_mut()?;
            session.selected_address_id = None;
            session.current_step = CheckoutStep::Address;
            self.commit(&state).await?;
        }
        Ok(state.addresses.clone())
    }

    pub async fn select_address(
        &self,
        address_id: AddressId,
    ) -> Result<CheckoutSession, CheckoutError> {
        let mut state = self.state.lock().await;
        if !state.addresses.iter().any(|a| a.id == address_id) {
            return Err(CheckoutError::validation(
                "Please select one of your saved addresses",
            ));
        }
        state.session_mut()?.selected_address_id = Some(address_id);
        self.commit(&state).await
    }

    /// Choosing COD on an ineligible cart is rejected with the offending items
    pub async fn select_payment_method(
        &self,
        method: PaymentMethod,
    ) -> Result<CheckoutSession, CheckoutError> {
        let mut state = self.state.lock().await;
        state.session()?;

        if method == PaymentMethod::Cod {
            let eligibility = self.cod_eligibility(&mut state).await?;
            if !eligibility.eligible {
                return Err(CheckoutError::CodUnavailable {
                    disqualifying_items: eligibility.disqualifying_items,
                });
            }
        }

        state.session_mut()?.selected_payment_method = Some(method);
        self.commit(&state).await
    }

    pub async fn apply_coupon(&self, code: &str) -> Result<AppliedCoupon, CheckoutError> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(CheckoutError::validation("Please enter a coupon code"));
        }
        self.state.lock().await.session()?;

        let evaluation = self.api.apply_coupon(&code).await?;
        if !evaluation.eligible {
            return Err(CheckoutError::CouponRejected {
                code: evaluation.code,
                reason: evaluation
                    .reason
                    .unwrap_or(crate::types::CouponRejectionReason::UnknownCode),
            });
        }

        let applied = AppliedCoupon {
            code: evaluation.code,
            discount_amount: evaluation.discount_amount,
        };
        let mut state = self.state.lock().await;
        state.session_mut()?.applied_coupon = Some(applied.clone());
        self.commit(&state).await?;
        Ok(applied)
    }

    /// Local only; no server call
    pub async fn remove_coupon(&self) -> Result<CheckoutSession, CheckoutError> {
        let mut state = self.state.lock().await;
        state.session_mut()?.applied_coupon = None;
        self.commit(&state).await
    }

    /// Invalidate everything derived from the cart contents
    pub async fn cart_changed(&self) {
        self.state.lock().await.cod = None;
    }

    pub async fn enter(&self, step: CheckoutStep) -> Result<CheckoutSession, CheckoutError> {
        self.apply_event(StepEvent::Enter(step)).await
    }

    pub async fn advance(&self) -> Result<CheckoutSession, CheckoutError> {
        self.apply_event(StepEvent::Advance).await
    }

    pub async fn retreat(&self) -> Result<CheckoutSession, CheckoutError> {
        self.apply_event(StepEvent::Retreat).await
    }

    /// Server no longer knows the selected address
    pub async fn force_address_step(&self) -> Result<CheckoutSession, CheckoutError> {
        let addresses = self.api.addresses().await.unwrap_or_default();
        let mut state = self.state.lock().await;
        if !addresses.is_empty() {
            state.addresses = addresses;
        }
        let session = state.session_mut()?;
        session.selected_address_id = None;
        session.current_step = CheckoutStep::Address;
        self.commit(&state).await
    }

    /// Validate the payment step and take the in-flight guard
    pub async fn begin_submit(
        &self,
    ) -> Result<(SubmitPermit, CreateOrderRequest), CheckoutError> {
        let state = self.state.lock().await;
        let session = state.session()?;

        if session.current_step != CheckoutStep::Payment {
            return Err(CheckoutError::validation(
                "Please review your order before paying",
            ));
        }
        let Some(address_id) = session.selected_address_id.filter(|_| state.address_resolvable())
        else {
            return Err(CheckoutError::validation(
                "Please select a delivery address to continue",
            ));
        };
        let Some(payment_method) = session.selected_payment_method else {
            return Err(CheckoutError::validation("Please select a payment method"));
        };

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CheckoutError::SubmitInFlight);
        }

        let request = CreateOrderRequest {
            address_id,
            payment_method,
            coupon_code: session.applied_coupon.as_ref().map(|c| c.code.clone()),
            session_key: Some(session.session_key.clone()),
        };
        Ok((
            SubmitPermit {
                flag: self.in_flight.clone(),
                held: false,
            },
            request,
        ))
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Tear down after confirmation and show the confirmation view.
    /// Returns false if the session was already torn down.
    pub async fn finish(&self, order_number: &str) -> bool {
        if !self.teardown().await {
            return false;
        }
        info!(order_number = %order_number, "checkout finished");
        self.navigator.navigate_to_confirmation(order_number).await;
        true
    }

    /// Explicit cancellation by the customer
    pub async fn cancel(&self) -> bool {
        let torn_down = self.teardown().await;
        if torn_down {
            info!("checkout cancelled");
        }
        torn_down
    }

    async fn teardown(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.session.take().is_none() {
            return false;
        }
        state.cod = None;
        CheckoutSession::clear(self.store.as_ref()).await;
        self.in_flight.store(false, Ordering::SeqCst);
        true
    }

    async fn apply_event(&self, event: StepEvent) -> Result<CheckoutSession, CheckoutError> {
        let mut state = self.state.lock().await;
        let current = state.session()?.current_step;

        let next = transition(current, event, state.guards()).map_err(|rejection| {
            debug!(current = %current, event = ?event, "step transition rejected");
            CheckoutError::validation(rejection.message())
        })?;

        if next == CheckoutStep::Payment && current != CheckoutStep::Payment {
            self.gate_cod(&mut state).await?;
        }

        state.session_mut()?.current_step = next;
        self.commit(&state).await
    }

    /// Re-check COD before the payment step is shown; an ineligible COD
    /// selection is dropped
    async fn gate_cod(&self, state: &mut ControllerState) -> Result<CodEligibility, CheckoutError> {
        let eligibility = self.cod_eligibility(state).await?;
        let session = state.session_mut()?;
        if !eligibility.eligible && session.selected_payment_method == Some(PaymentMethod::Cod) {
            debug!(
                disqualifying_items = ?eligibility.disqualifying_items,
                "COD no longer available, clearing selection"
            );
            session.selected_payment_method = None;
        }
        Ok(eligibility)
    }

    /// Cached per cart; refetched after [`cart_changed`](Self::cart_changed)
    async fn cod_eligibility(
        &self,
        state: &mut ControllerState,
    ) -> Result<CodEligibility, CheckoutError> {
        if let Some(cached) = &state.cod {
            return Ok(cached.clone());
        }
        let eligibility = self.api.cod_eligibility().await?;
        state.cod = Some(eligibility.clone());
        Ok(eligibility)
    }

    /// Persist, then mirror the step
    async fn commit(&self, state: &ControllerState) -> Result<CheckoutSession, CheckoutError> {
        let session = state.session()?;
        session.persist(self.store.as_ref()).await;
        self.navigator.show_step(session.current_step).await;
        Ok(session.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::client::ApiError;
    use crate::checkout::session::{MemorySessionStore, UrlNavigator};
    use crate::types::{
        ConfirmationResult, CouponEvaluation, CouponRejectionReason, OrderCreationResult,
        VerifyPaymentRequest,
    };
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    struct StubApi {
        addresses: Vec<Address>,
        cod_eligible: bool,
    }

    #[async_trait]
    impl CheckoutApi for StubApi {
        async fn addresses(&self) -> Result<Vec<Address>, ApiError> {
            Ok(self.addresses.clone())
        }

        async fn apply_coupon(&self, code: &str) -> Result<CouponEvaluation, ApiError> {
            Ok(match code {
                "FLAT100" => CouponEvaluation::approved(code, Decimal::from(100)),
                _ => CouponEvaluation::rejected(code, CouponRejectionReason::UnknownCode),
            })
        }

        async fn cod_eligibility(&self) -> Result<CodEligibility, ApiError> {
            Ok(CodEligibility {
                eligible: self.cod_eligible,
                disqualifying_items: if self.cod_eligible {
                    vec![]
                } else {
                    vec!["Gift Card".to_string()]
                },
                cart_fingerprint: "fp".to_string(),
            })
        }

        async fn create_order(
            &self,
            _request: &CreateOrderRequest,
        ) -> Result<OrderCreationResult, ApiError> {
            Err(ApiError::transport("not used"))
        }

        async fn verify_payment(
            &self,
            _request: &VerifyPaymentRequest,
        ) -> Result<ConfirmationResult, ApiError> {
            Err(ApiError::transport("not used"))
        }
    }

    fn address(is_default: bool) -> Address {
        Address {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            label: "Work".to_string(),
            line1: "4 Residency Road".to_string(),
            city: "Bengaluru".to_string(),
            postal_code: "560025".to_string(),
            is_default,
        }
    }

    fn controller(
        addresses: Vec<Address>,
        cod_eligible: bool,
    ) -> (StepController, Arc<MemorySessionStore>, Arc<UrlNavigator>) {
        let store = Arc::new(MemorySessionStore::new());
        let navigator = Arc::new(UrlNavigator::new("/checkout"));
        let api = Arc::new(StubApi {
            addresses,
            cod_eligible,
        });
        (
            StepController::new(api, store.clone(), navigator.clone()),
            store,
            navigator,
        )
    }

    async fn at_payment(controller: &StepController) {
        controller.begin().await.unwrap();
        controller.enter(CheckoutStep::Payment).await.unwrap();
        controller
            .select_payment_method(PaymentMethod::Online)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_begin_preselects_default_address() {
        let default = address(true);
        let (controller, _, navigator) = controller(vec![address(false), default.clone()], true);

        let session = controller.begin().await.unwrap();

        assert_eq!(session.selected_address_id, Some(default.id));
        assert_eq!(session.current_step, CheckoutStep::Address);
        assert_eq!(
            navigator.location().await.as_deref(),
            Some("/checkout?step=address")
        );
    }

    #[tokio::test]
    async fn test_mutations_are_persisted() {
        let (controller, store, _) = controller(vec![address(true)], true);
        at_payment(&controller).await;

        let stored = CheckoutSession::load(store.as_ref()).await.unwrap();
        assert_eq!(stored.selected_payment_method, Some(PaymentMethod::Online));
        assert_eq!(stored.session_key, controller.snapshot().await.unwrap().session_key);
    }

    #[tokio::test]
    async fn test_unknown_address_is_rejected() {
        let (controller, _, _) = controller(vec![address(true)], true);
        controller.begin().await.unwrap();

        let err = controller.select_address(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_coupon_codes_are_normalized_and_checked() {
        let (controller, _, _) = controller(vec![address(true)], true);
        controller.begin().await.unwrap();

        assert!(matches!(
            controller.apply_coupon("   ").await,
            Err(CheckoutError::Validation { .. })
        ));
        assert!(matches!(
            controller.apply_coupon("bogus").await,
            Err(CheckoutError::CouponRejected {
                reason: CouponRejectionReason::UnknownCode,
                ..
            })
        ));

        let applied = controller.apply_coupon(" flat100 ").await.unwrap();
        assert_eq!(applied.code, "FLAT100");
        let session = controller.remove_coupon().await.unwrap();
        assert!(session.applied_coupon.is_none());
    }

    #[tokio::test]
    async fn test_cod_rejected_for_ineligible_cart() {
        let (controller, _, _) = controller(vec![address(true)], false);
        controller.begin().await.unwrap();
        controller.enter(CheckoutStep::Payment).await.unwrap();

        let err = controller
            .select_payment_method(PaymentMethod::Cod)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::CodUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_submit_guard_is_exclusive() {
        let (controller, _, _) = controller(vec![address(true)], true);
        at_payment(&controller).await;

        let (permit, request) = controller.begin_submit().await.unwrap();
        assert_eq!(request.payment_method, PaymentMethod::Online);
        assert!(request.session_key.is_some());
        assert!(controller.is_submitting());
        assert!(matches!(
            controller.begin_submit().await,
            Err(CheckoutError::SubmitInFlight)
        ));

        drop(permit);
        assert!(!controller.is_submitting());

        let (permit, _) = controller.begin_submit().await.unwrap();
        permit.hold();
        assert!(controller.is_submitting());

        assert!(controller.cancel().await);
        assert!(!controller.is_submitting());
    }

    #[tokio::test]
    async fn test_submit_requires_payment_step() {
        let (controller, _, _) = controller(vec![address(true)], true);
        controller.begin().await.unwrap();

        assert!(matches!(
            controller.begin_submit().await,
            Err(CheckoutError::Validation { .. })
        ));
        assert!(!controller.is_submitting());
    }

    #[tokio::test]
    async fn test_finish_tears_down_once() {
        let (controller, store, navigator) = controller(vec![address(true)], true);
        at_payment(&controller).await;

        assert!(controller.finish("ORD-1").await);
        assert!(!controller.finish("ORD-1").await);
        assert!(store.is_empty().await);
        assert_eq!(
            navigator.location().await.as_deref(),
            Some("/orders/ORD-1/confirmation")
        );
    }
}
