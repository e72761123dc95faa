pub mod board_lock;
