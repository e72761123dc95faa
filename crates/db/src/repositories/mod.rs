pub mod board_lock_repo;

pub use board_lock_repo::BoardLockRepo;
