pub mod allocation;
pub mod cleanup;
pub mod events;
pub mod gateway;
pub mod ledger;
