use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ko,
    En,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::Ko => "ko",
            Language::En => "en",
        }
    }

    /// Accepts `ko`, `en` and region-tagged forms like `en-US`.
    pub fn parse(value: &str) -> Option<Language> {
        let primary = value.trim().split(['-', '_']).next()?.to_lowercase();
        match primary.as_str() {
            "ko" => Some(Language::Ko),
            "en" => Some(Language::En),
            _ => None,
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::parse(s).ok_or_else(|| format!("Unsupported language: '{}'", s))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

const EN: &[(&str, &str)] = &[
    ("nav.home", "Home"),
    ("nav.explore", "Explore"),
    ("nav.write", "Write"),
    ("nav.dashboard", "Dashboard"),
    ("nav.admin", "Admin"),
    ("nav.notifications", "Notifications"),
    ("nav.profile", "Profile"),
    ("nav.settings", "Settings"),
    ("auth.login", "Log in"),
    ("auth.logout", "Log out"),
    ("auth.signup", "Sign up"),
    ("auth.email", "Email"),
    ("auth.password", "Password"),
    ("auth.invalid", "Invalid email or password"),
    ("editor.title", "Title"),
    ("editor.content", "Write your story..."),
    ("editor.excerpt", "Excerpt"),
    ("editor.tags", "Tags"),
    ("editor.category", "Category"),
    ("editor.coverImage", "Cover image"),
    ("editor.visibility", "Visibility"),
    ("editor.schedule", "Schedule"),
    ("editor.saveDraft", "Save draft"),
    ("editor.publish", "Publish"),
    ("editor.autosave", "Auto-save"),
    ("editor.saved", "Saved"),
    ("editor.drafts", "Drafts"),
    ("editor.newDraft", "New draft"),
    ("editor.deleteDraft", "Delete draft"),
    ("editor.wordCount", "Words"),
    ("editor.readTime", "min read"),
    ("post.likes", "Likes"),
    ("post.comments", "Comments"),
    ("post.bookmark", "Bookmark"),
    ("post.share", "Share"),
    ("post.featured", "Featured"),
    ("profile.followers", "Followers"),
    ("profile.following", "Following"),
    ("profile.follow", "Follow"),
    ("profile.unfollow", "Unfollow"),
    ("admin.users", "Users"),
    ("admin.posts", "Posts"),
    ("admin.comments", "Comments"),
    ("admin.subscribers", "Subscribers"),
    ("admin.categories", "Categories"),
    ("admin.tags", "Tags"),
    ("admin.reports", "Reports"),
    ("admin.analytics", "Analytics"),
    ("common.save", "Save"),
    ("common.cancel", "Cancel"),
    ("common.delete", "Delete"),
    ("common.loading", "Loading..."),
];

// Keys missing here fall back to English.
const KO: &[(&str, &str)] = &[
    ("nav.home", "홈"),
    ("nav.explore", "탐색"),
    ("nav.write", "글쓰기"),
    ("nav.dashboard", "대시보드"),
    ("nav.admin", "관리자"),
    ("nav.notifications", "알림"),
    ("nav.profile", "프로필"),
    ("nav.settings", "설정"),
    ("auth.login", "로그인"),
    ("auth.logout", "로그아웃"),
    ("auth.signup", "회원가입"),
    ("auth.email", "이메일"),
    ("auth.password", "비밀번호"),
    ("auth.invalid", "이메일 또는 비밀번호가 올바르지 않습니다"),
    ("editor.title", "제목"),
    ("editor.content", "이야기를 작성하세요..."),
    ("editor.excerpt", "요약"),
    ("editor.tags", "태그"),
    ("editor.category", "카테고리"),
    ("editor.coverImage", "커버 이미지"),
    ("editor.visibility", "공개 범위"),
    ("editor.schedule", "예약 발행"),
    ("editor.saveDraft", "임시저장"),
    ("editor.publish", "발행"),
    ("editor.autosave", "자동 저장"),
    ("editor.saved", "저장됨"),
    ("editor.drafts", "임시저장 글"),
    ("editor.newDraft", "새 글"),
    ("editor.deleteDraft", "임시저장 삭제"),
    ("editor.wordCount", "단어"),
    ("editor.readTime", "분 소요"),
    ("post.likes", "좋아요"),
    ("post.comments", "댓글"),
    ("post.bookmark", "북마크"),
    ("post.share", "공유"),
    ("post.featured", "추천"),
    ("profile.followers", "팔로워"),
    ("profile.following", "팔로잉"),
    ("profile.follow", "팔로우"),
    ("profile.unfollow", "언팔로우"),
    ("admin.users", "사용자"),
    ("admin.posts", "게시글"),
    ("admin.comments", "댓글"),
    ("admin.subscribers", "구독자"),
    ("admin.categories", "카테고리"),
    ("admin.tags", "태그"),
    ("admin.reports", "신고"),
    ("admin.analytics", "통계"),
    ("common.save", "저장"),
    ("common.cancel", "취소"),
    ("common.delete", "삭제"),
];

fn table(language: Language) -> &'static [(&'static str, &'static str)] {
    match language {
        Language::Ko => KO,
        Language::En => EN,
    }
}

fn lookup(language: Language, key: &str) -> Option<&'static str> {
    table(language).iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Text for `key` in `language`, else in English, else the key itself.
pub fn translate<'a>(language: Language, key: &'a str) -> &'a str {
    lookup(language, key)
        .or_else(|| lookup(Language::En, key))
        .unwrap_or(key)
}

/// Every key with its text in `language`, English filling the gaps.
pub fn dictionary(language: Language) -> BTreeMap<&'static str, &'static str> {
    let mut merged: BTreeMap<&'static str, &'static str> = EN.iter().copied().collect();
    merged.extend(table(language).iter().copied());
    merged
}
