pub mod commerce;
pub mod inventory_log;
pub mod order;
pub mod order_history;
pub mod order_item;
pub mod product;
