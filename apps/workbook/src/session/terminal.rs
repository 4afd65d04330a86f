pub mod tty;
