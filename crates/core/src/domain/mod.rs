pub mod cart;
pub mod market;
pub mod observation;
pub mod product;
