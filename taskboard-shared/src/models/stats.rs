//! Aggregate counts for the admin dashboard

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::BTreeMap;

use super::project::Project;
use super::task::{RecentActivity, Task};
use super::user::{Role, User};

/// Number of entries in the recent activity feed
pub const RECENT_ACTIVITY_LIMIT: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_users: i64,
    pub total_projects: i64,
    pub total_tasks: i64,
}

/// Dashboard statistics
///
/// `users_by_role` and `tasks_by_status` only contain keys with at least
/// one row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub overview: Overview,
    pub users_by_role: BTreeMap<String, i64>,
    pub tasks_by_status: BTreeMap<String, i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_activity: Option<Vec<RecentActivity>>,
}

impl AdminStats {
    /// Computes every figure from the local database
    pub async fn collect(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let total_users = User::count(pool).await?;
        let users_by_role = User::count_by_role(pool)
            .await?
            .into_iter()
            .map(|(role, count)| (role.to_string(), count))
            .collect();

        let mut stats = Self::with_user_counts(pool, total_users, users_by_role).await?;
        stats.recent_activity = Some(Task::recent_activity(pool, RECENT_ACTIVITY_LIMIT).await?);

        Ok(stats)
    }

    /// Computes project and task figures locally, taking user figures from
    /// an authoritative user list
    pub async fn collect_with_users<I>(pool: &PgPool, roles: I) -> Result<Self, sqlx::Error>
    where
        I: IntoIterator<Item = Role>,
    {
        let mut total_users = 0;
        let mut users_by_role = BTreeMap::new();
        for role in roles {
            total_users += 1;
            *users_by_role.entry(role.to_string()).or_insert(0) += 1;
        }

        Self::with_user_counts(pool, total_users, users_by_role).await
    }

    async fn with_user_counts(
        pool: &PgPool,
        total_users: i64,
        users_by_role: BTreeMap<String, i64>,
    ) -> Result<Self, sqlx::Error> {
        let total_projects = Project::count(pool).await?;
        let total_tasks = Task::count(pool).await?;
        let tasks_by_status = Task::count_by_status(pool)
            .await?
            .into_iter()
            .map(|(status, count)| (status.to_string(), count))
            .collect();

        Ok(Self {
            overview: Overview {
                total_users,
                total_projects,
                total_tasks,
            },
            users_by_role,
            tasks_by_status,
            recent_activity: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_wire_shape() {
        let stats = AdminStats {
            overview: Overview {
                total_users: 3,
                total_projects: 1,
                total_tasks: 4,
            },
            users_by_role: BTreeMap::from([("ADMIN".to_string(), 1), ("USER".to_string(), 2)]),
            tasks_by_status: BTreeMap::from([("DONE".to_string(), 4)]),
            recent_activity: None,
        };

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["overview"]["totalUsers"], 3);
        assert_eq!(json["usersByRole"]["USER"], 2);
        assert_eq!(json["tasksByStatus"]["DONE"], 4);
        assert!(json.get("recentActivity").is_none());
    }
}
