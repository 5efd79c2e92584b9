
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub created_at: String,
}

impl User {
    /// "First Last", falling back to the username.
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.username.clone()
        } else {
            name.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct Post {
    pub id: i64,
    pub text: String,
    pub pub_date: String,
    pub author_id: i64,
    pub group_id: Option<i64>,
    pub image: Option<String>,
}

impl Post {
    /// Short label used in logs and listings.
    pub fn excerpt(&self) -> String {
        self.text.chars().take(15).collect()
    }
}

#[derive(Debug, Clone)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub text: String,
    pub created: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(first: &str, last: &str) -> User {
        User {
            id: 1,
            username: "leo".into(),
            first_name: first.into(),
            last_name: last.into(),
            email: String::new(),
            created_at: String::new(),
        }
    }

    #[test]
    fn full_name_joins_names() {
        assert_eq!(user("Leo", "Tolstoy").full_name(), "Leo Tolstoy");
    }

    #[test]
    fn full_name_falls_back_to_username() {
        assert_eq!(user("", "").full_name(), "leo");
    }

    #[test]
    fn excerpt_is_first_fifteen_chars() {
        let post = Post {
            id: 1,
            text: "Первый пост в БД и ещё немного".into(),
            pub_date: String::new(),
            author_id: 1,
            group_id: None,
            image: None,
        };
        assert_eq!(post.excerpt(), "Первый пост в Б");
    }
}
