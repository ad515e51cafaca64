//! Integration tests: full rounds replayed through an in-memory score source.

mod mock_feed;
mod round_replay;
