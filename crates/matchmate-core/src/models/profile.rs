use serde::{Deserialize, Serialize};

use super::user::UserInfo;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub description: String,
    pub parish: String,
    #[serde(default)]
    pub biography: String,
    pub sex: String,
    pub race: String,
    pub birth_year: i32,
    pub height: f64,
    pub fav_cuisine: String,
    pub fav_colour: String,
    pub fav_school_subject: String,
    pub political: bool,
    pub religious: bool,
    pub family_oriented: bool,
}

impl Profile {
    /// One-line label for lists: description with parish.
    pub fn headline(&self) -> String {
        format!("#{} {} ({})", self.id, self.description, self.parish)
    }
}

/// A match result: the candidate profile plus who owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ProfileWithUser {
    #[serde(flatten)]
    pub profile: Profile,
    pub user: UserInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Favourite {
    pub id: i64,
    pub user_id: i64,
    pub fav_user_id: i64,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct TopFavourite {
    pub user_id: i64,
    pub name: String,
    pub favourite_count: i64,
}

/// Filters for `GET /search`. Unset filters are left out of the query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ProfileSearchParams {
    pub name: Option<String>,
    pub birth_year: Option<i32>,
    pub sex: Option<String>,
    pub race: Option<String>,
}

impl ProfileSearchParams {
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(ref name) = self.name {
            query.push(("name".to_string(), name.clone()));
        }
        if let Some(year) = self.birth_year {
            query.push(("birth_year".to_string(), year.to_string()));
        }
        if let Some(ref sex) = self.sex {
            query.push(("sex".to_string(), sex.clone()));
        }
        if let Some(ref race) = self.race {
            query.push(("race".to_string(), race.clone()));
        }
        query
    }

    pub fn is_empty(&self) -> bool {
        self.to_query().is_empty()
    }
}
