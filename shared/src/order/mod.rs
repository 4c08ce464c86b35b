//! Order domain types shared by the server and its clients

pub mod dto;
mod model;
pub mod types;

pub use dto::{
    AskReturnRequest, BoughtOrders, BuyRequest, ChainCallbackRequest, ChainCallbackResponse,
    SellRequest, ShipRequest, StopSellingResponse,
};
pub use model::{BuyInfo, Express, ExpressDraft, Order, OrderDetail, ReturnRequest};
pub use types::{
    ChainResult, OrderStatus, ParseEnumError, PriceType, ProductType, ReturnStatus,
};
