use super::*;
use crate::catalog::{CatalogError, ProductInfo};
use crate::chain::NotifyError;
use crate::db::{Closing, MemoryOrderStore, StoreResult};
use crate::pictures::UploadError;
use async_trait::async_trait;
use base64::Engine;
use parking_lot::Mutex;
use shared::order::{Express, ProductType};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

const SELLER: &str = "alice";
const BUYER: &str = "bob";
const BIDDER: &str = "carol";

/// Product ids seeded into the fake catalog
const DIGIT: i64 = 1;
const ENTITY: i64 = 2;
const ONLY_SHOW: i64 = 3;
const BOBS_DIGIT: i64 = 4;

const START_MILLIS: i64 = 1_700_000_000_000;

// ========================================================================
// Fakes
// ========================================================================

#[derive(Default)]
struct RecordingNotifier {
    requests: Mutex<Vec<ChainRequest>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    fn requests(&self) -> Vec<ChainRequest> {
        self.requests.lock().clone()
    }

    fn last(&self) -> Option<ChainRequest> {
        self.requests.lock().last().cloned()
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl SettlementNotifier for RecordingNotifier {
    async fn notify(&self, request: ChainRequest) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Timeout);
        }
        self.requests.lock().push(request);
        Ok(())
    }
}

struct FakeCatalog {
    products: Mutex<HashMap<i64, ProductInfo>>,
    transfers: Mutex<Vec<(i64, String, f64)>>,
    failing: AtomicBool,
}

impl FakeCatalog {
    fn seeded() -> Self {
        let product = |owner: &str, product_type| ProductInfo {
            owner: owner.to_string(),
            product_type,
        };
        let products = HashMap::from([
            (DIGIT, product(SELLER, ProductType::Digit)),
            (ENTITY, product(SELLER, ProductType::Entity)),
            (ONLY_SHOW, product(SELLER, ProductType::OnlyShow)),
            (BOBS_DIGIT, product(BUYER, ProductType::Digit)),
        ]);
        Self {
            products: Mutex::new(products),
            transfers: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    fn transfers(&self) -> Vec<(i64, String, f64)> {
        self.transfers.lock().clone()
    }

    fn owner(&self, product_id: i64) -> Option<String> {
        self.products.lock().get(&product_id).map(|p| p.owner.clone())
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn get_product(&self, product_id: i64) -> Result<ProductInfo, CatalogError> {
        self.products
            .lock()
            .get(&product_id)
            .cloned()
            .ok_or(CatalogError::NotFound(product_id))
    }

    async fn transfer_ownership(
        &self,
        product_id: i64,
        new_owner: &str,
        final_price: f64,
    ) -> Result<(), CatalogError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("connection refused".into()));
        }
        if let Some(p) = self.products.lock().get_mut(&product_id) {
            p.owner = new_owner.to_string();
        }
        self.transfers
            .lock()
            .push((product_id, new_owner.to_string(), final_price));
        Ok(())
    }
}

/// Accepts valid base64 and names the picture after its size
struct FakeUploader;

#[async_trait]
impl PictureUploader for FakeUploader {
    async fn upload(&self, image_base64: &str) -> Result<String, UploadError> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(image_base64)?;
        Ok(format!("https://pics.test/{}.png", bytes.len()))
    }
}

/// Holds order loads at a barrier so racing commands both plan from the
/// same snapshot before either commits
struct RendezvousStore {
    inner: Arc<MemoryOrderStore>,
    barrier: Mutex<Option<Arc<tokio::sync::Barrier>>>,
}

impl RendezvousStore {
    fn new(inner: Arc<MemoryOrderStore>) -> Self {
        Self {
            inner,
            barrier: Mutex::new(None),
        }
    }

    /// The next `parties` loads wait for each other
    fn arm(&self, parties: usize) {
        *self.barrier.lock() = Some(Arc::new(tokio::sync::Barrier::new(parties)));
    }

    fn disarm(&self) {
        self.barrier.lock().take();
    }
}

#[async_trait]
impl OrderStore for RendezvousStore {
    async fn find_by_order_id(&self, order_id: &str) -> StoreResult<Option<Order>> {
        let snapshot = self.inner.find_by_order_id(order_id).await?;
        let barrier = self.barrier.lock().clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        Ok(snapshot)
    }

    async fn find_by_chain_id(&self, chain_id: &str) -> StoreResult<Option<Order>> {
        self.inner.find_by_chain_id(chain_id).await
    }

    async fn find_by_product_id(&self, product_id: i64) -> StoreResult<Option<Order>> {
        self.inner.find_by_product_id(product_id).await
    }

    async fn find_by_buyer(&self, buyer: &str) -> StoreResult<Vec<Order>> {
        self.inner.find_by_buyer(buyer).await
    }

    async fn find_by_seller(&self, seller: &str) -> StoreResult<Vec<Order>> {
        self.inner.find_by_seller(seller).await
    }

    async fn list_live(&self) -> StoreResult<Vec<Order>> {
        self.inner.list_live().await
    }

    async fn find_closed_by_order_id(&self, order_id: &str) -> StoreResult<Option<Order>> {
        self.inner.find_closed_by_order_id(order_id).await
    }

    async fn find_closed_by_chain_id(&self, chain_id: &str) -> StoreResult<Option<Order>> {
        self.inner.find_closed_by_chain_id(chain_id).await
    }

    async fn find_closed_by_buyer(&self, buyer: &str) -> StoreResult<Vec<Order>> {
        self.inner.find_closed_by_buyer(buyer).await
    }

    async fn insert(&self, order: &Order) -> StoreResult<()> {
        self.inner.insert(order).await
    }

    async fn update_status(
        &self,
        order_id: &str,
        expected: OrderStatus,
        change: StatusChange,
    ) -> StoreResult<Order> {
        self.inner.update_status(order_id, expected, change).await
    }

    async fn delete(&self, order_id: &str) -> StoreResult<Order> {
        self.inner.delete(order_id).await
    }

    async fn close(
        &self,
        order_id: &str,
        expected: OrderStatus,
        closing: Closing,
    ) -> StoreResult<Order> {
        self.inner.close(order_id, expected, closing).await
    }

    async fn record_chain_error(
        &self,
        order_id: &str,
        expected: OrderStatus,
        message: &str,
    ) -> StoreResult<Order> {
        self.inner.record_chain_error(order_id, expected, message).await
    }

    async fn find_return(&self, order_id: &str) -> StoreResult<Option<ReturnRequest>> {
        self.inner.find_return(order_id).await
    }

    async fn find_express(&self, express_id: i64) -> StoreResult<Option<Express>> {
        self.inner.find_express(express_id).await
    }
}

// ========================================================================
// Harness
// ========================================================================

struct Harness {
    coordinator: OrderCoordinator,
    store: Arc<MemoryOrderStore>,
    /// The coordinator's view of `store`; arm it to race two commands
    gate: Arc<RendezvousStore>,
    notifier: Arc<RecordingNotifier>,
    catalog: Arc<FakeCatalog>,
    clock: Arc<AtomicI64>,
}

impl Harness {
    fn advance_secs(&self, secs: i64) {
        self.clock.fetch_add(secs * 1000, Ordering::SeqCst);
    }
}

fn create_test_coordinator() -> Harness {
    let store = Arc::new(MemoryOrderStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let catalog = Arc::new(FakeCatalog::seeded());
    let clock = Arc::new(AtomicI64::new(START_MILLIS));

    let gate = Arc::new(RendezvousStore::new(store.clone()));
    let ticks = clock.clone();
    let coordinator = OrderCoordinator::new(
        gate.clone(),
        notifier.clone(),
        catalog.clone(),
        Arc::new(FakeUploader),
        DEFAULT_MAX_DURATION_SECS,
    )
    .with_clock(Arc::new(move || ticks.load(Ordering::SeqCst)));

    Harness {
        coordinator,
        store,
        gate,
        notifier,
        catalog,
        clock,
    }
}

fn sell_request(product_id: i64, price_type: PriceType, price: f64, chain_id: &str) -> SellRequest {
    SellRequest {
        product_id,
        price_type,
        price,
        duration_seconds: Some(10),
        chain_id: chain_id.to_string(),
    }
}

async fn list(h: &Harness, product_id: i64, price_type: PriceType, price: f64, chain_id: &str) -> Order {
    h.coordinator
        .sell(SELLER, sell_request(product_id, price_type, price, chain_id))
        .await
        .expect("sell should succeed")
}

fn express(number: &str) -> ShipRequest {
    ShipRequest {
        company: "SF Express".to_string(),
        number: number.to_string(),
    }
}

/// Fixed-price entity listing bought and shipped
async fn dispatched_entity(h: &Harness, chain_id: &str) -> Order {
    let order = list(h, ENTITY, PriceType::Fix, 80.0, chain_id).await;
    h.coordinator.buy(BUYER, &order.id, None).await.unwrap();
    h.coordinator
        .ship_product(SELLER, &order.id, express("SF-001"))
        .await
        .unwrap()
}

/// Live orders never hold a terminal status, closed orders always do
async fn assert_partition_invariant(h: &Harness) {
    for order in h.store.list_live().await.unwrap() {
        assert!(!order.status.is_terminal(), "live order {} is {}", order.id, order.status);
    }
    for buyer in [BUYER, BIDDER] {
        for order in h.store.find_closed_by_buyer(buyer).await.unwrap() {
            assert!(order.status.is_terminal(), "closed order {} is {}", order.id, order.status);
            assert!(order.complete_time.is_some());
        }
    }
}
