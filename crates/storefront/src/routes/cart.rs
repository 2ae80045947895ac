//! Cart route handlers.
//!
//! Cart operations use HTMX for dynamic updates without full page reloads.
//! The cart itself is stored in the visitor's session under the same key the
//! static site used in `localStorage`.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use dsi_core::{CART_KEY, CartItem, CartNavigation, CartStore, LineItemId};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result, add_breadcrumb};
use crate::services::SessionStorage;
use crate::state::AppState;

/// HTMX event fired whenever the cart changes.
const CART_UPDATED_TRIGGER: (&str, &str) = ("HX-Trigger", "cart-updated");

/// Cart item display data for templates.
#[derive(Clone)]
pub struct CartItemView {
    pub id: String,
    pub item_key: String,
    pub label: String,
    pub image_ref: String,
}

/// Cart display data for templates.
#[derive(Clone)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub item_count: usize,
}

impl From<&CartItem> for CartItemView {
    fn from(item: &CartItem) -> Self {
        Self {
            id: item.id().to_string(),
            item_key: item.item_key().to_string(),
            label: item.label().to_string(),
            image_ref: item.image_ref().to_string(),
        }
    }
}

impl From<&[CartItem]> for CartView {
    fn from(items: &[CartItem]) -> Self {
        Self {
            items: items.iter().map(CartItemView::from).collect(),
            item_count: items.len(),
        }
    }
}

// =============================================================================
// Session Helpers
// =============================================================================

/// Open the visitor's cart from the session.
async fn open_cart(state: &AppState, session: &Session) -> Result<CartStore<SessionStorage>> {
    let config = state.config();
    let storage = SessionStorage::load(session, &[CART_KEY], config.cart_quota_bytes).await?;
    Ok(CartStore::new(storage).with_placeholder_image(config.placeholder_image.clone()))
}

/// Persist whatever the cart operation changed back into the session.
///
/// Runs after read-only operations too: a load that finds nothing valid
/// removes the stored key.
async fn close_cart(cart: CartStore<SessionStorage>, session: &Session) -> Result<()> {
    cart.into_storage().flush(session).await?;
    Ok(())
}

/// Add to cart form data.
///
/// Fields default to empty so a button with missing attributes still reaches
/// the cart, which drops records without an item key on the next load.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    #[serde(default)]
    pub item_key: String,
    #[serde(default)]
    pub label: String,
    pub image_ref: Option<String>,
}

/// Remove from cart form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub id: String,
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub cart: CartView,
}

/// Cart items fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_items.html")]
pub struct CartItemsTemplate {
    pub cart: CartView,
}

/// Cart count badge fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_count.html")]
pub struct CartCountTemplate {
    pub count: usize,
}

/// Display cart page.
#[instrument(skip(state, session))]
pub async fn show(State(state): State<AppState>, session: Session) -> Result<CartShowTemplate> {
    let cart = open_cart(&state, &session).await?;
    let items = cart.load_cart();
    close_cart(cart, &session).await?;

    Ok(CartShowTemplate {
        cart: CartView::from(items.as_slice()),
    })
}

/// Add item to cart (HTMX).
///
/// Returns the updated count badge with an HTMX trigger so other elements can
/// refresh.
#[instrument(skip(state, session))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<AddToCartForm>,
) -> Result<Response> {
    let cart = open_cart(&state, &session).await?;
    let count = cart.add_item(&form.item_key, &form.label, form.image_ref.as_deref())?;
    close_cart(cart, &session).await?;

    add_breadcrumb(
        "cart",
        "Added item to cart",
        Some(&[("item_key", form.item_key.as_str())]),
    );

    Ok((
        AppendHeaders([CART_UPDATED_TRIGGER]),
        CartCountTemplate { count },
    )
        .into_response())
}

/// Remove item from cart (HTMX).
///
/// Responds 404 when the id is not in the visitor's cart.
#[instrument(skip(state, session))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RemoveFromCartForm>,
) -> Result<Response> {
    let id: LineItemId = form
        .id
        .parse()
        .map_err(|e: dsi_core::ParseLineItemIdError| AppError::BadRequest(e.to_string()))?;

    let cart = open_cart(&state, &session).await?;
    let removed = cart.remove_item(id)?;
    let items = cart.load_cart();
    close_cart(cart, &session).await?;

    if !removed {
        return Err(AppError::NotFound(format!("line item {id}")));
    }

    Ok((
        AppendHeaders([CART_UPDATED_TRIGGER]),
        CartItemsTemplate {
            cart: CartView::from(items.as_slice()),
        },
    )
        .into_response())
}

/// Get cart count badge (HTMX).
#[instrument(skip(state, session))]
pub async fn count(State(state): State<AppState>, session: Session) -> Result<CartCountTemplate> {
    let cart = open_cart(&state, &session).await?;
    let count = cart.render_cart_count();
    close_cart(cart, &session).await?;

    Ok(CartCountTemplate { count })
}

/// Send the visitor to the cart page, or stay put when the cart is empty.
#[instrument(skip(state, session))]
pub async fn go(State(state): State<AppState>, session: Session) -> Result<Response> {
    let cart = open_cart(&state, &session).await?;
    let navigation = cart.go_to_cart();
    close_cart(cart, &session).await?;

    Ok(match navigation {
        CartNavigation::Open => Redirect::to(&state.config().cart_path).into_response(),
        CartNavigation::Stay => StatusCode::NO_CONTENT.into_response(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_view_from_items() {
        let items = vec![
            CartItem::new("p1", "Extintor PQS", None, "assets/placeholder.jpg"),
            CartItem::new("p2", "Gabinete", Some("img/gabinete.jpg"), "assets/placeholder.jpg"),
        ];

        let view = CartView::from(items.as_slice());

        assert_eq!(view.item_count, 2);
        assert_eq!(view.items[1].item_key, "p2");
        assert_eq!(view.items[0].image_ref, "assets/placeholder.jpg");
        assert_eq!(view.items[1].id, items[1].id().to_string());
    }

    #[test]
    fn test_count_badge_renders_count() {
        let html = CartCountTemplate { count: 3 }.render();
        assert!(html.is_ok_and(|html| html.contains(">3<")));
    }
}
