pub mod binance_us;
