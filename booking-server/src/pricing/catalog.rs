//! 价格目录 (内存缓存)
//!
//! 服务、子服务、目的地、目的地定价、办理时效选项。
//! 由上层 (后台管理 / 同步任务) 写入, 计价时只读。

use parking_lot::RwLock;
use rust_decimal::Decimal;
use shared::models::{
    Destination, ProcessingTimeOption, Service, ServiceDestinationPricing, SubService,
};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct CatalogInner {
    services: HashMap<i64, Service>,
    sub_services: HashMap<i64, SubService>,
    destinations: HashMap<i64, Destination>,
    /// (service_id, destination_id) → price
    destination_prices: HashMap<(i64, i64), Decimal>,
    processing_times: HashMap<i64, ProcessingTimeOption>,
}

/// Shared, cheaply cloneable pricing catalog
#[derive(Clone, Default)]
pub struct PricingCatalog {
    inner: Arc<RwLock<CatalogInner>>,
}

impl std::fmt::Debug for PricingCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("PricingCatalog")
            .field("services", &inner.services.len())
            .field("sub_services", &inner.sub_services.len())
            .field("destinations", &inner.destinations.len())
            .field("destination_prices", &inner.destination_prices.len())
            .field("processing_times", &inner.processing_times.len())
            .finish()
    }
}

impl PricingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Writes ==========

    pub fn upsert_service(&self, service: Service) {
        self.inner.write().services.insert(service.id, service);
    }

    pub fn upsert_sub_service(&self, sub_service: SubService) {
        self.inner
            .write()
            .sub_services
            .insert(sub_service.id, sub_service);
    }

    pub fn upsert_destination(&self, destination: Destination) {
        self.inner
            .write()
            .destinations
            .insert(destination.id, destination);
    }

    pub fn set_destination_price(&self, pricing: ServiceDestinationPricing) {
        self.inner
            .write()
            .destination_prices
            .insert((pricing.service_id, pricing.destination_id), pricing.price);
    }

    pub fn remove_destination_price(&self, service_id: i64, destination_id: i64) -> bool {
        self.inner
            .write()
            .destination_prices
            .remove(&(service_id, destination_id))
            .is_some()
    }

    pub fn upsert_processing_time(&self, option: ProcessingTimeOption) {
        self.inner.write().processing_times.insert(option.id, option);
    }

    /// 删除服务及其子服务和目的地定价
    pub fn remove_service(&self, service_id: i64) -> Option<Service> {
        let mut inner = self.inner.write();
        inner.sub_services.retain(|_, s| s.service_id != service_id);
        inner
            .destination_prices
            .retain(|(sid, _), _| *sid != service_id);
        inner.services.remove(&service_id)
    }

    // ========== Reads ==========

    pub fn get_service(&self, service_id: i64) -> Option<Service> {
        self.inner.read().services.get(&service_id).cloned()
    }

    pub fn list_services(&self) -> Vec<Service> {
        let mut services: Vec<Service> = self.inner.read().services.values().cloned().collect();
        services.sort_by_key(|s| s.id);
        services
    }

    pub fn get_sub_service(&self, sub_service_id: i64) -> Option<SubService> {
        self.inner.read().sub_services.get(&sub_service_id).cloned()
    }

    pub fn sub_services_of(&self, service_id: i64) -> Vec<SubService> {
        let mut subs: Vec<SubService> = self
            .inner
            .read()
            .sub_services
            .values()
            .filter(|s| s.service_id == service_id)
            .cloned()
            .collect();
        subs.sort_by_key(|s| s.id);
        subs
    }

    pub fn get_destination(&self, destination_id: i64) -> Option<Destination> {
        self.inner.read().destinations.get(&destination_id).cloned()
    }

    pub fn destination_price(&self, service_id: i64, destination_id: i64) -> Option<Decimal> {
        self.inner
            .read()
            .destination_prices
            .get(&(service_id, destination_id))
            .copied()
    }

    pub fn get_processing_time(&self, option_id: i64) -> Option<ProcessingTimeOption> {
        self.inner.read().processing_times.get(&option_id).cloned()
    }
}
