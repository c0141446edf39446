use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::jobs::model::Customer;

#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub suburb: String,
}

#[derive(Clone)]
pub struct CustomersRepo {
    pool: PgPool,
}

impl CustomersRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> anyhow::Result<Option<Customer>> {
        let row = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Look the customer up by phone, creating it on first contact.
    /// Returns the customer and whether it was created by this call.
    pub async fn find_or_create(
        conn: &mut PgConnection,
        input: &NewCustomer,
    ) -> anyhow::Result<(Customer, bool)> {
        let inserted = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (name, phone, email, suburb)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (phone) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.phone)
        .bind(&input.email)
        .bind(&input.suburb)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(customer) = inserted {
            return Ok((customer, true));
        }

        let existing = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE phone = $1")
            .bind(&input.phone)
            .fetch_one(&mut *conn)
            .await?;
        Ok((existing, false))
    }
}
