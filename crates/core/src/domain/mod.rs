pub mod affiliate;
pub mod credentials;
pub mod crm;
pub mod customer;
pub mod order;
