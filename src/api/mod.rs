pub mod kabu;
