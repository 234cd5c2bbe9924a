//! Data models for matchmate entities.
//!
//! This module contains the data structures exchanged with the API:
//!
//! - `UserSummary`: the signed-in user snapshot kept with the credential
//! - `User`, `UserInfo`: public user details
//! - `Profile`, `ProfileWithUser`: dating profiles and match results
//! - `Favourite`, `TopFavourite`: favourites and the most-favoured report
//! - Forms: `RegisterForm`, `LoginForm`, `NewProfileForm` with local validation

pub mod forms;
pub mod profile;
pub mod user;

pub use forms::{LoginForm, NewProfileForm, PhotoUpload, RegisterForm};
pub use profile::{Favourite, Profile, ProfileSearchParams, ProfileWithUser, TopFavourite};
pub use user::{AuthPayload, User, UserInfo, UserSummary};
