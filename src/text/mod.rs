//! MDL, the text form of the model format.
//!
//! Decoding goes through [`TokenStream`], a token cursor with one token of
//! lookahead. Encoding writes the same blocks back with tab indentation.
//! Chunks kept from a binary file have no text form and are not written.

pub mod lexer;
mod read;
mod write;

pub use lexer::{Spanned, Token, TokenStream};
