pub mod stream_handlers;
