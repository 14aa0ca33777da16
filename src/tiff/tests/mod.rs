mod byte_order_tests;
mod parser_tests;
mod saver_tests;
mod test_utils;
mod types_tests;
