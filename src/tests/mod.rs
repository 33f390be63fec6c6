#[cfg(test)]
pub mod order_tests;


#[cfg(test)]
pub mod pool_tests;
