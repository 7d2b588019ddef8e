/*!
This crate contains small utilities shared by the other crates in this workspace.
*/

#![allow(clippy::tabs_in_doc_comments)]

pub mod finite;
