// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod action;
pub mod blob;
pub mod id;
