pub mod trading_day;
