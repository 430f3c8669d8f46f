// Core services
pub mod inventory;
pub mod orders;

// Commerce
pub mod commerce;

pub use inventory::InventoryService;
pub use orders::OrderService;
