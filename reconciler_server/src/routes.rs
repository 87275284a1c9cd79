//! HTTP routes exposed by the reconciler.
//!
//! The reconciler is mostly a set of background workers. The only public surfaces are a liveness probe and a read-only
//! balance lookup for the marketplace front end. Nothing here writes to the ledger.
use actix_web::{get, web, HttpResponse, Responder};
use ledger_engine::{traits::BalanceManagement, BalanceApi};
use log::*;

use crate::errors::ServerError;

// Actix cannot register generic handlers with its attribute macros, so `route!` builds the service factory by hand
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Balance  ----------------------------------------------------
route!(balance => Get "/balance/{user_id}" impl BalanceManagement);
/// The user's spendable USD balance, e.g. `{"usd": "12.34"}`.
///
/// Reconciliation problems never show up here. If the balance cannot be calculated the caller gets a generic error,
/// never a partial or zero balance.
pub async fn balance<B: BalanceManagement>(
    path: web::Path<i64>,
    api: web::Data<BalanceApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let user_id = path.into_inner();
    debug!("💻️ GET balance for user {user_id}");
    let balance = api.get_balance(user_id).await?;
    Ok(HttpResponse::Ok().json(balance))
}
