mod deribit;

pub use deribit::DeribitOrderBookFetcher;
