//! Candidate exclusion, filter parsing, tag-overlap scoring and match
//! derivation. Everything here is pure; `candidates` turns filters into SQL.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::{Like, Tag, User};

pub const FALLBACK_REASON: &str = "Recently joined";

/// Users the caller must never be shown.
#[derive(Debug, Default, Clone)]
pub struct ExclusionSet {
    ids: HashSet<Uuid>,
}

impl ExclusionSet {
    pub fn for_user(me: Uuid) -> Self {
        let mut ids = HashSet::new();
        ids.insert(me);
        Self { ids }
    }

    pub fn extend(&mut self, ids: impl IntoIterator<Item = Uuid>) {
        self.ids.extend(ids);
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.ids.contains(id)
    }

    pub fn to_vec(&self) -> Vec<Uuid> {
        self.ids.iter().copied().collect()
    }
}

/// Raw query string filters. List filters are comma separated; `all` disables one.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FilterQuery {
    pub campus: Option<String>,
    pub faculty: Option<String>,
    pub grade: Option<String>,
    pub gender: Option<String>,
    pub sexuality: Option<String>,
    pub looking_for: Option<String>,
    pub tags: Option<String>,
    pub min_age: Option<i32>,
    pub max_age: Option<i32>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProfileFilters {
    pub campus: Vec<String>,
    pub faculty: Vec<String>,
    pub grade: Vec<String>,
    pub gender: Vec<String>,
    pub sexuality: Vec<String>,
    pub looking_for: Vec<String>,
    pub tags: Vec<String>,
    pub min_age: Option<i32>,
    pub max_age: Option<i32>,
}

fn parse_list(raw: &Option<String>) -> Vec<String> {
    let Some(raw) = raw else { return Vec::new() };
    let values: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if values.iter().any(|v| v == "all") {
        return Vec::new();
    }
    values
}

impl From<&FilterQuery> for ProfileFilters {
    fn from(q: &FilterQuery) -> Self {
        Self {
            campus: parse_list(&q.campus),
            faculty: parse_list(&q.faculty),
            grade: parse_list(&q.grade),
            gender: parse_list(&q.gender),
            sexuality: parse_list(&q.sexuality),
            looking_for: parse_list(&q.looking_for),
            tags: parse_list(&q.tags),
            min_age: q.min_age,
            max_age: q.max_age,
        }
    }
}

impl ProfileFilters {
    pub fn applied(&self) -> serde_json::Value {
        let mut applied = serde_json::Map::new();
        let lists = [
            ("campus", &self.campus),
            ("faculty", &self.faculty),
            ("grade", &self.grade),
            ("gender", &self.gender),
            ("sexuality", &self.sexuality),
            ("looking_for", &self.looking_for),
            ("tags", &self.tags),
        ];
        for (name, values) in lists {
            if !values.is_empty() {
                applied.insert(name.to_string(), serde_json::json!(values));
            }
        }
        if let Some(min) = self.min_age {
            applied.insert("min_age".into(), min.into());
        }
        if let Some(max) = self.max_age {
            applied.insert("max_age".into(), max.into());
        }
        serde_json::Value::Object(applied)
    }
}

/// Birthday bounds equivalent to an age range on `today`: born on or before
/// the first date and strictly after the second.
pub fn birthday_bounds(
    min_age: Option<i32>,
    max_age: Option<i32>,
    today: NaiveDate,
) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let years_ago = |years: i32| today.checked_sub_months(Months::new(12 * years.clamp(0, 200) as u32));
    let born_by = min_age.and_then(years_ago);
    let born_after = max_age.and_then(|max| years_ago(max.saturating_add(1)));
    (born_by, born_after)
}

#[derive(Debug, Clone)]
pub struct CandidateProfile {
    pub user: User,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone)]
pub struct RankedSuggestion {
    pub candidate: CandidateProfile,
    pub score: usize,
    pub match_score: f64,
    pub reason: String,
}

/// Candidate tags that the caller also has. Hidden tags never count.
pub fn shared_tag_names(my_tags: &HashSet<Uuid>, user: &User, tags: &[Tag]) -> Vec<String> {
    if !user.show_tags {
        return Vec::new();
    }
    let mut names: Vec<String> = tags
        .iter()
        .filter(|t| my_tags.contains(&t.id))
        .map(|t| t.name.clone())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// `score / |my tags|` clamped to [0, 1] and rounded to three decimals.
pub fn match_score(score: usize, my_tag_count: usize) -> f64 {
    if my_tag_count == 0 {
        return 0.0;
    }
    let raw = (score as f64 / my_tag_count as f64).clamp(0.0, 1.0);
    (raw * 1000.0).round() / 1000.0
}

pub fn suggestion_reason(shared: &[String]) -> String {
    if shared.is_empty() {
        FALLBACK_REASON.to_string()
    } else {
        format!("Common tags: {}", shared.join(", "))
    }
}

/// Ranks by shared tag count then recency. Falls back to recently joined,
/// completed profiles when the caller has no tags or nobody overlaps.
pub fn rank_suggestions(
    my_tags: &[Tag],
    candidates: Vec<CandidateProfile>,
    limit: usize,
) -> Vec<RankedSuggestion> {
    let mine: HashSet<Uuid> = my_tags.iter().map(|t| t.id).collect();

    let mut ranked: Vec<RankedSuggestion> = candidates
        .into_iter()
        .map(|candidate| {
            let shared = shared_tag_names(&mine, &candidate.user, &candidate.tags);
            RankedSuggestion {
                score: shared.len(),
                match_score: match_score(shared.len(), mine.len()),
                reason: suggestion_reason(&shared),
                candidate,
            }
        })
        .collect();

    let any_overlap = ranked.iter().any(|r| r.score > 0);
    if mine.is_empty() || !any_overlap {
        ranked.retain(|r| r.candidate.user.profile_completed);
        for r in ranked.iter_mut() {
            r.score = 0;
            r.match_score = 0.0;
            r.reason = FALLBACK_REASON.to_string();
        }
    }

    ranked.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.candidate.user.created_at.cmp(&a.candidate.user.created_at))
    });
    ranked.truncate(limit);
    ranked
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchEdge {
    pub user_id: Uuid,
    pub matched_at: DateTime<Utc>,
}

/// Intersects outgoing and incoming likes. `matched_at` is the later of the
/// two likes; newest matches first.
pub fn derive_matches(sent: &[Like], received: &[Like]) -> Vec<MatchEdge> {
    let incoming: HashMap<Uuid, DateTime<Utc>> =
        received.iter().map(|l| (l.liker_id, l.created_at)).collect();

    let mut matches: Vec<MatchEdge> = sent
        .iter()
        .filter_map(|out| {
            incoming.get(&out.liked_id).map(|their_at| MatchEdge {
                user_id: out.liked_id,
                matched_at: out.created_at.max(*their_at),
            })
        })
        .collect();

    matches.sort_by(|a, b| b.matched_at.cmp(&a.matched_at));
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::views::age_on;
    use crate::services::views::fixtures::{tag, user};
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()
    }

    fn like(liker: Uuid, liked: Uuid, at: DateTime<Utc>) -> Like {
        Like { id: Uuid::new_v4(), liker_id: liker, liked_id: liked, created_at: at }
    }

    #[test]
    fn exclusion_contains_self() {
        let me = Uuid::new_v4();
        let mut set = ExclusionSet::for_user(me);
        let blocked = Uuid::new_v4();
        set.extend([blocked]);
        assert!(set.contains(&me));
        assert!(set.contains(&blocked));
        assert_eq!(set.to_vec().len(), 2);
    }

    #[test]
    fn tag_overlap_score_and_reason() {
        let (a, b, c, d) = (tag("A"), tag("B"), tag("C"), tag("D"));
        let mine = vec![a.clone(), b.clone(), c.clone()];
        let candidate = CandidateProfile { user: user("Bo"), tags: vec![b, c, d] };

        let ranked = rank_suggestions(&mine, vec![candidate], 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].score, 2);
        assert_eq!(ranked[0].match_score, 0.667);
        assert!(ranked[0].reason.contains("B, C"));
    }

    #[test]
    fn ranking_prefers_score_then_recency() {
        let (a, b) = (tag("A"), tag("B"));
        let mine = vec![a.clone(), b.clone()];
        let now = Utc::now();

        let mut older_two = user("Old");
        older_two.created_at = now - Duration::days(10);
        let mut newer_one = user("New");
        newer_one.created_at = now;
        let mut older_one = user("Mid");
        older_one.created_at = now - Duration::days(5);

        let ranked = rank_suggestions(
            &mine,
            vec![
                CandidateProfile { user: older_one, tags: vec![a.clone()] },
                CandidateProfile { user: newer_one, tags: vec![b.clone()] },
                CandidateProfile { user: older_two, tags: vec![a, b] },
            ],
            10,
        );
        let names: Vec<&str> = ranked.iter().map(|r| r.candidate.user.display_name.as_str()).collect();
        assert_eq!(names, vec!["Old", "New", "Mid"]);
        assert_eq!(ranked[0].match_score, 1.0);
    }

    #[test]
    fn fallback_when_no_tags() {
        let now = Utc::now();
        let mut incomplete = user("Inc");
        incomplete.profile_completed = false;
        let mut early = user("Early");
        early.created_at = now - Duration::days(3);
        let late = user("Late");

        let ranked = rank_suggestions(
            &[],
            vec![
                CandidateProfile { user: early, tags: vec![tag("x")] },
                CandidateProfile { user: incomplete, tags: vec![] },
                CandidateProfile { user: late, tags: vec![] },
            ],
            10,
        );
        let names: Vec<&str> = ranked.iter().map(|r| r.candidate.user.display_name.as_str()).collect();
        assert_eq!(names, vec!["Late", "Early"]);
        assert!(ranked.iter().all(|r| r.match_score == 0.0 && r.reason == FALLBACK_REASON));
    }

    #[test]
    fn hidden_tags_do_not_score() {
        let a = tag("A");
        let mut shy = user("Shy");
        shy.show_tags = false;
        let ranked = rank_suggestions(
            &[a.clone()],
            vec![CandidateProfile { user: shy, tags: vec![a] }],
            10,
        );
        assert_eq!(ranked[0].score, 0);
        assert_eq!(ranked[0].reason, FALLBACK_REASON);
    }

    #[test]
    fn limit_truncates() {
        let candidates = (0..5)
            .map(|i| CandidateProfile { user: user(&format!("U{i}")), tags: vec![] })
            .collect();
        assert_eq!(rank_suggestions(&[], candidates, 3).len(), 3);
    }

    #[test]
    fn match_score_bounds() {
        assert_eq!(match_score(0, 0), 0.0);
        assert_eq!(match_score(5, 2), 1.0);
        assert_eq!(match_score(1, 3), 0.333);
    }

    #[test]
    fn filter_lists_and_all() {
        let query = FilterQuery {
            gender: Some("Man, woman".into()),
            faculty: Some("all".into()),
            campus: Some(" , ".into()),
            ..Default::default()
        };
        let filters = ProfileFilters::from(&query);
        assert!(filters.faculty.is_empty());
        assert!(filters.campus.is_empty());
        assert_eq!(filters.gender, vec!["man", "woman"]);
        assert_eq!(filters.applied()["gender"], serde_json::json!(["man", "woman"]));
        assert!(filters.applied().get("faculty").is_none());
    }

    #[test]
    fn birthday_bounds_agree_with_age() {
        let dates = [
            today(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        ];
        for on in dates {
            let (born_by, born_after) = birthday_bounds(Some(18), Some(25), on);
            let (born_by, born_after) = (born_by.unwrap(), born_after.unwrap());

            let mut birthday = NaiveDate::from_ymd_opt(1995, 1, 1).unwrap();
            let last = NaiveDate::from_ymd_opt(2010, 12, 31).unwrap();
            while birthday <= last {
                let in_bounds = birthday <= born_by && birthday > born_after;
                let in_range = (18..=25).contains(&age_on(birthday, on));
                assert_eq!(in_bounds, in_range, "birthday {birthday} on {on}");
                birthday = birthday.succ_opt().unwrap();
            }
        }
    }

    #[test]
    fn open_ended_age_bounds() {
        assert_eq!(birthday_bounds(None, None, today()), (None, None));
        let (born_by, born_after) = birthday_bounds(Some(21), None, today());
        assert_eq!(born_by, NaiveDate::from_ymd_opt(2003, 6, 14));
        assert!(born_after.is_none());
    }

    #[test]
    fn mutual_likes_derive_match() {
        let me = Uuid::new_v4();
        let them = Uuid::new_v4();
        let other = Uuid::new_v4();
        let t0 = Utc::now() - Duration::hours(2);
        let t1 = Utc::now();

        let sent = vec![like(me, them, t0), like(me, other, t0)];
        let received = vec![like(them, me, t1)];

        let matches = derive_matches(&sent, &received);
        assert_eq!(matches, vec![MatchEdge { user_id: them, matched_at: t1 }]);
    }

    #[test]
    fn one_sided_like_is_not_match() {
        let me = Uuid::new_v4();
        let sent = vec![like(me, Uuid::new_v4(), Utc::now())];
        assert!(derive_matches(&sent, &[]).is_empty());
    }
}
