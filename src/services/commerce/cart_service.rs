use crate::{
    db,
    entities::commerce::{CartModel, CartStatus},
    errors::ServiceError,
    repositories::{CartSnapshot, CartStore, VariantStore},
};
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::Display;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Which cart a request should operate on, decided from who is asking and
/// which carts already exist.
#[derive(Debug, Clone, PartialEq)]
pub enum CartResolution {
    /// Signed-in user with an active cart and nothing to merge.
    UserCartExists { cart: CartModel },
    /// Anonymous session with an active guest cart.
    GuestOnly { cart: CartModel },
    /// Signed-in user who still has a guest cart from before login. The guest
    /// lines are folded into `user_cart`, or the guest cart is claimed when
    /// the user has none.
    Merge {
        guest_cart: CartModel,
        user_cart: Option<CartModel>,
    },
    /// No usable cart yet.
    CreateNew {
        user_id: Option<Uuid>,
        session_id: Option<String>,
    },
}

/// Tag for the resolution that was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CartTransition {
    UserCartExists,
    GuestOnly,
    Merge,
    CreateNew,
}

impl CartResolution {
    /// Picks the transition. Pure: all lookups happen before this is called.
    pub fn plan(
        user_id: Option<Uuid>,
        session_id: Option<String>,
        user_cart: Option<CartModel>,
        guest_cart: Option<CartModel>,
    ) -> Self {
        match (user_id, user_cart, guest_cart) {
            (Some(_), user_cart, Some(guest_cart)) => Self::Merge {
                guest_cart,
                user_cart,
            },
            (Some(_), Some(cart), None) => Self::UserCartExists { cart },
            (None, _, Some(cart)) => Self::GuestOnly { cart },
            (user_id, _, None) => Self::CreateNew {
                user_id,
                session_id,
            },
        }
    }

    pub fn transition(&self) -> CartTransition {
        match self {
            Self::UserCartExists { .. } => CartTransition::UserCartExists,
            Self::GuestOnly { .. } => CartTransition::GuestOnly,
            Self::Merge { .. } => CartTransition::Merge,
            Self::CreateNew { .. } => CartTransition::CreateNew,
        }
    }
}

/// The cart a request ended up with.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCart {
    pub cart: CartModel,
    pub transition: CartTransition,
}

/// Input for adding item to cart
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartInput {
    pub variant_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

/// Shopping cart service: resolves the caller's cart and edits its lines.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    carts: Arc<dyn CartStore>,
    variants: Arc<dyn VariantStore>,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        carts: Arc<dyn CartStore>,
        variants: Arc<dyn VariantStore>,
    ) -> Self {
        Self {
            db,
            carts,
            variants,
        }
    }

    /// Finds or builds the cart for a user and/or anonymous session,
    /// merging a leftover guest cart into the user's on the way.
    #[instrument(skip(self))]
    pub async fn resolve_cart(
        &self,
        user_id: Option<Uuid>,
        session_id: Option<String>,
    ) -> Result<ResolvedCart, ServiceError> {
        let txn = self.db.begin().await?;
        let result = self.resolve_in(&txn, user_id, session_id).await;
        db::finish(txn, result).await
    }

    /// Adds a variant to the caller's cart, summing with an existing line.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Option<Uuid>,
        session_id: Option<String>,
        input: AddToCartInput,
    ) -> Result<CartSnapshot, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;
        let result = async {
            self.variants
                .find(&txn, input.variant_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Variant {} not found", input.variant_id))
                })?;

            let resolved = self.resolve_in(&txn, user_id, session_id).await?;
            self.carts
                .add_quantity(&txn, resolved.cart.id, input.variant_id, input.quantity)
                .await?;
            self.carts.snapshot(&txn, resolved.cart.id).await
        }
        .await;
        let snapshot = db::finish(txn, result).await?;

        info!(
            "Added item to cart {}: variant {} x{}",
            snapshot.cart_id, input.variant_id, input.quantity
        );
        Ok(snapshot)
    }

    /// Sets the quantity of a line; zero or less removes it.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        user_id: Option<Uuid>,
        session_id: Option<String>,
        variant_id: Uuid,
        quantity: i32,
    ) -> Result<CartSnapshot, ServiceError> {
        let txn = self.db.begin().await?;
        let result = async {
            let resolved = self.resolve_in(&txn, user_id, session_id).await?;
            let found = self
                .carts
                .set_quantity(&txn, resolved.cart.id, variant_id, quantity)
                .await?;
            if !found {
                return Err(ServiceError::NotFound(format!(
                    "Variant {} is not in the cart",
                    variant_id
                )));
            }
            self.carts.snapshot(&txn, resolved.cart.id).await
        }
        .await;
        db::finish(txn, result).await
    }

    /// Current contents of the caller's cart.
    pub async fn view_cart(
        &self,
        user_id: Option<Uuid>,
        session_id: Option<String>,
    ) -> Result<CartSnapshot, ServiceError> {
        let txn = self.db.begin().await?;
        let result = async {
            let resolved = self.resolve_in(&txn, user_id, session_id).await?;
            self.carts.snapshot(&txn, resolved.cart.id).await
        }
        .await;
        db::finish(txn, result).await
    }

    /// Snapshot of a user's active cart without creating or merging
    /// anything.
    pub async fn get_snapshot(&self, user_id: Uuid) -> Result<Option<CartSnapshot>, ServiceError> {
        let txn = self.db.begin().await?;
        let result = self.carts.snapshot_for_user(&txn, user_id).await;
        db::finish(txn, result).await
    }

    async fn resolve_in(
        &self,
        txn: &DatabaseTransaction,
        user_id: Option<Uuid>,
        session_id: Option<String>,
    ) -> Result<ResolvedCart, ServiceError> {
        let session_id = session_id.filter(|s| !s.trim().is_empty());
        if user_id.is_none() && session_id.is_none() {
            return Err(ServiceError::Unauthorized(
                "A user id or a session id is required".to_string(),
            ));
        }

        let user_cart = match user_id {
            Some(user_id) => self.carts.find_active_by_user(txn, user_id).await?,
            None => None,
        };
        let guest_cart = match session_id.as_deref() {
            Some(session) => self.carts.find_active_by_session(txn, session).await?,
            None => None,
        };

        let resolution = CartResolution::plan(user_id, session_id, user_cart, guest_cart);
        let transition = resolution.transition();

        let cart = match resolution {
            CartResolution::UserCartExists { cart } | CartResolution::GuestOnly { cart } => cart,
            CartResolution::Merge {
                guest_cart,
                user_cart: Some(user_cart),
            } => {
                for item in self.carts.items(txn, guest_cart.id).await? {
                    self.carts
                        .add_quantity(txn, user_cart.id, item.variant_id, item.quantity)
                        .await?;
                }
                self.carts.clear_cart(txn, guest_cart.id).await?;
                self.carts
                    .set_status(txn, guest_cart.id, CartStatus::Merged)
                    .await?;
                info!(guest_cart_id = %guest_cart.id, cart_id = %user_cart.id, "Merged guest cart");
                user_cart
            }
            CartResolution::Merge {
                guest_cart,
                user_cart: None,
            } => {
                let owner = user_id.ok_or_else(|| {
                    ServiceError::InternalError("merge planned without a user".to_string())
                })?;
                info!(cart_id = %guest_cart.id, user_id = %owner, "Claimed guest cart");
                self.carts.claim(txn, guest_cart.id, owner).await?
            }
            CartResolution::CreateNew {
                user_id,
                session_id,
            } => {
                let cart = self.carts.create_cart(txn, user_id, session_id).await?;
                info!("Created cart: {}", cart.id);
                cart
            }
        };

        Ok(ResolvedCart { cart, transition })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn cart(user_id: Option<Uuid>, session_id: Option<&str>) -> CartModel {
        CartModel {
            id: Uuid::new_v4(),
            user_id,
            session_id: session_id.map(str::to_string),
            status: CartStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn plan_covers_the_four_transitions() {
        let user = Uuid::new_v4();
        let user_cart = cart(Some(user), None);
        let guest_cart = cart(None, Some("sess"));

        let plan = CartResolution::plan(Some(user), None, Some(user_cart.clone()), None);
        assert_eq!(plan.transition(), CartTransition::UserCartExists);

        let plan = CartResolution::plan(None, Some("sess".into()), None, Some(guest_cart.clone()));
        assert_eq!(plan.transition(), CartTransition::GuestOnly);

        let plan = CartResolution::plan(
            Some(user),
            Some("sess".into()),
            Some(user_cart),
            Some(guest_cart.clone()),
        );
        assert_eq!(plan.transition(), CartTransition::Merge);

        let plan = CartResolution::plan(None, Some("sess".into()), None, None);
        assert_eq!(
            plan,
            CartResolution::CreateNew {
                user_id: None,
                session_id: Some("sess".into())
            }
        );
    }

    #[test]
    fn guest_cart_without_user_cart_is_still_a_merge() {
        let guest_cart = cart(None, Some("sess"));
        let plan = CartResolution::plan(
            Some(Uuid::new_v4()),
            Some("sess".into()),
            None,
            Some(guest_cart.clone()),
        );
        assert_eq!(
            plan,
            CartResolution::Merge {
                guest_cart,
                user_cart: None
            }
        );
    }

    #[test]
    fn add_input_requires_positive_quantity() {
        let input = AddToCartInput {
            variant_id: Uuid::new_v4(),
            quantity: 0,
        };
        assert!(input.validate().is_err());
        assert_eq!(CartTransition::CreateNew.to_string(), "create_new");
    }
}
