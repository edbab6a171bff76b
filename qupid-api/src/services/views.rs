//! Response projections of [`User`] rows.
//!
//! Every response that shows another user goes through [`project_user`] or
//! [`project_summary`], so `show_*` flags are applied in one place.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Tag, User};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TagView {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

impl From<&Tag> for TagView {
    fn from(tag: &Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name.clone(),
            description: tag.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PrivacySettings {
    pub show_campus: bool,
    pub show_faculty: bool,
    pub show_grade: bool,
    pub show_birthday: bool,
    pub show_age: bool,
    pub show_gender: bool,
    pub show_sexuality: bool,
    pub show_looking_for: bool,
    pub show_bio: bool,
    pub show_tags: bool,
}

impl From<&User> for PrivacySettings {
    fn from(u: &User) -> Self {
        Self {
            show_campus: u.show_campus,
            show_faculty: u.show_faculty,
            show_grade: u.show_grade,
            show_birthday: u.show_birthday,
            show_age: u.show_age,
            show_gender: u.show_gender,
            show_sexuality: u.show_sexuality,
            show_looking_for: u.show_looking_for,
            show_bio: u.show_bio,
            show_tags: u.show_tags,
        }
    }
}

/// Another user as seen by the caller.
#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub campus: Option<String>,
    pub faculty: Option<String>,
    pub grade: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub sexuality: Option<String>,
    pub looking_for: Option<String>,
    pub tags: Vec<TagView>,
    pub is_online: bool,
    pub profile_completed: bool,
    pub created_at: DateTime<Utc>,
}

/// Compact partner card used by chat listings.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub is_online: bool,
}

/// The caller's own profile, unredacted.
#[derive(Debug, Clone, Serialize)]
pub struct OwnProfile {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub campus: Option<String>,
    pub faculty: Option<String>,
    pub grade: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub sexuality: Option<String>,
    pub looking_for: Option<String>,
    pub tags: Vec<TagView>,
    pub privacy: PrivacySettings,
    pub is_admin: bool,
    pub profile_completed: bool,
    pub has_password: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn age_on(birthday: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birthday.year();
    if (today.month(), today.day()) < (birthday.month(), birthday.day()) {
        age -= 1;
    }
    age
}

fn shown<T: Clone>(flag: bool, value: &Option<T>) -> Option<T> {
    if flag { value.clone() } else { None }
}

pub fn project_user(user: &User, tags: &[Tag], today: NaiveDate) -> PublicUser {
    PublicUser {
        id: user.id,
        display_name: user.display_name.clone(),
        avatar_url: user.avatar_url.clone(),
        bio: shown(user.show_bio, &user.bio),
        campus: shown(user.show_campus, &user.campus),
        faculty: shown(user.show_faculty, &user.faculty),
        grade: shown(user.show_grade, &user.grade),
        birthday: shown(user.show_birthday, &user.birthday),
        age: if user.show_age { user.birthday.map(|b| age_on(b, today)) } else { None },
        gender: shown(user.show_gender, &user.gender),
        sexuality: shown(user.show_sexuality, &user.sexuality),
        looking_for: shown(user.show_looking_for, &user.looking_for),
        tags: if user.show_tags { tags.iter().map(TagView::from).collect() } else { Vec::new() },
        is_online: user.is_online,
        profile_completed: user.profile_completed,
        created_at: user.created_at,
    }
}

pub fn project_summary(user: &User) -> UserSummary {
    UserSummary {
        id: user.id,
        display_name: user.display_name.clone(),
        avatar_url: user.avatar_url.clone(),
        bio: shown(user.show_bio, &user.bio),
        is_online: user.is_online,
    }
}

pub fn own_profile(user: &User, tags: &[Tag], today: NaiveDate) -> OwnProfile {
    OwnProfile {
        id: user.id,
        email: user.email.clone(),
        display_name: user.display_name.clone(),
        avatar_url: user.avatar_url.clone(),
        bio: user.bio.clone(),
        campus: user.campus.clone(),
        faculty: user.faculty.clone(),
        grade: user.grade.clone(),
        birthday: user.birthday,
        age: user.birthday.map(|b| age_on(b, today)),
        gender: user.gender.clone(),
        sexuality: user.sexuality.clone(),
        looking_for: user.looking_for.clone(),
        tags: tags.iter().map(TagView::from).collect(),
        privacy: PrivacySettings::from(user),
        is_admin: user.is_admin,
        profile_completed: user.profile_completed,
        has_password: user.hashed_password.is_some(),
        created_at: user.created_at,
        updated_at: user.updated_at,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn user(display_name: &str) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: format!("{}@kyushu-u.ac.jp", display_name.to_lowercase()),
            hashed_password: None,
            display_name: display_name.to_string(),
            bio: Some("likes hiking".into()),
            avatar_url: None,
            campus: Some("Ito".into()),
            faculty: Some("Engineering".into()),
            grade: Some("B3".into()),
            birthday: NaiveDate::from_ymd_opt(2003, 6, 15),
            gender: Some("woman".into()),
            sexuality: Some("lesbian".into()),
            looking_for: Some("dating".into()),
            show_campus: true,
            show_faculty: true,
            show_grade: true,
            show_birthday: false,
            show_age: true,
            show_gender: true,
            show_sexuality: true,
            show_looking_for: true,
            show_bio: true,
            show_tags: true,
            is_active: true,
            is_admin: false,
            profile_completed: true,
            is_online: false,
            last_seen_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn tag(name: &str) -> Tag {
        Tag {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{tag, user};
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()
    }

    #[test]
    fn age_before_and_after_birthday() {
        let birthday = NaiveDate::from_ymd_opt(2003, 6, 15).unwrap();
        assert_eq!(age_on(birthday, today()), 20);
        assert_eq!(age_on(birthday, NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()), 21);
    }

    #[test]
    fn hidden_bio_never_projected() {
        let mut u = user("Aki");
        u.show_bio = false;
        assert!(project_user(&u, &[], today()).bio.is_none());
        assert!(project_summary(&u).bio.is_none());
    }

    #[test]
    fn birthday_hidden_by_default_but_age_shown() {
        let projected = project_user(&user("Aki"), &[], today());
        assert!(projected.birthday.is_none());
        assert_eq!(projected.age, Some(20));
    }

    #[test]
    fn every_flag_is_honoured() {
        let mut u = user("Aki");
        u.show_campus = false;
        u.show_faculty = false;
        u.show_grade = false;
        u.show_age = false;
        u.show_gender = false;
        u.show_sexuality = false;
        u.show_looking_for = false;
        u.show_tags = false;
        let projected = project_user(&u, &[tag("music")], today());
        assert!(projected.campus.is_none());
        assert!(projected.faculty.is_none());
        assert!(projected.grade.is_none());
        assert!(projected.age.is_none());
        assert!(projected.gender.is_none());
        assert!(projected.sexuality.is_none());
        assert!(projected.looking_for.is_none());
        assert!(projected.tags.is_empty());
        assert_eq!(projected.display_name, "Aki");
    }

    #[test]
    fn public_json_has_no_email() {
        let json = serde_json::to_value(project_user(&user("Aki"), &[], today())).unwrap();
        assert!(json.get("email").is_none());
        assert!(json.get("hashed_password").is_none());
    }

    #[test]
    fn own_profile_is_unredacted() {
        let mut u = user("Aki");
        u.show_bio = false;
        let own = own_profile(&u, &[], today());
        assert_eq!(own.bio.as_deref(), Some("likes hiking"));
        assert!(!own.privacy.show_bio);
    }
}
