use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse::Parser, punctuated::Punctuated, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature,
    Token, Type,
};

/// Transform an asynchronous test into a synchronous one and inject
/// dependencies, each test getting its own isolated server.
///
/// The server runs over a fresh `MemoryStore` seeded with the example roster
/// and a `ManualClock` fixed inside the example election window.
///
/// Arguments (all optional, comma separated):
/// - `voter` or `admin`: log the client in as the example voter or admin.
/// - `waiting`, `active` or `ended`: where to put the clock (default `active`).
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`],
/// `crate::model::store::MemoryStore` and `crate::model::clock::ManualClock`.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = syn::parse_macro_input!(input as ItemFn);

    // Interpret the arguments.
    let options = match parse_options(args) {
        Ok(options) => options,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Extract type information and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Position the clock.
    let now = match options.phase {
        TestPhase::Waiting => quote! { window.starts_at() - chrono::Duration::hours(1) },
        TestPhase::Active => quote! { window.starts_at() + chrono::Duration::minutes(5) },
        TestPhase::Ended => quote! { window.ends_at() + chrono::Duration::hours(1) },
    };

    // Log in the client as admin/voter if needed.
    let maybe_login = match options.login {
        Some(Login::Admin) => quote! {
            crate::model::api::auth::LoginRequest::admin_example()
        },
        Some(Login::Voter) => quote! {
            crate::model::api::auth::LoginRequest::example()
        },
        None => TokenStream2::new(),
    };
    let maybe_login = if maybe_login.is_empty() {
        maybe_login
    } else {
        // Scoped so the response releases its borrow of the client.
        quote! {
            {
                let response = rocket_client
                    .post(uri!(crate::api::auth::login))
                    .header(rocket::http::ContentType::JSON)
                    .body(rocket::serde::json::json!(#maybe_login).to_string())
                    .dispatch()
                    .await;
                assert_eq!(rocket::http::Status::Ok, response.status(), "test login failed");
            }
        }
    };

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            /// Test setup.
            async fn setup() -> (
                rocket::local::asynchronous::Client,
                crate::model::store::MemoryStore,
                crate::model::clock::ManualClock,
            ) {
                log4rs_test_utils::test_logging::init_logging_once_for(
                    vec!["election_backend"],
                    None,
                    None,
                );

                let window = crate::model::common::ElectionWindow::example();
                let store = crate::model::store::MemoryStore::from_roster(
                    &crate::model::db::Roster::example(),
                )
                .unwrap();
                let clock = crate::model::clock::ManualClock::new(#now);
                let rocket_client = rocket::local::asynchronous::Client::tracked(
                    crate::rocket_for_test(store.clone(), clock.clone()),
                )
                .await
                .unwrap();

                #maybe_login

                (rocket_client, store, clock)
            }

            /// The test itself.
            #item_fn

            // The server runs on this runtime too, so give it several workers
            // for tests that fire concurrent requests.
            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(4)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                #[allow(unused_variables)]
                let (rocket_client, store, clock) = setup().await;
                #new_name(#(#test_args),*).await;
            });
        }
    }
    .into()
}

enum Login {
    Voter,
    Admin,
}

#[derive(Default)]
enum TestPhase {
    Waiting,
    #[default]
    Active,
    Ended,
}

#[derive(Default)]
struct Options {
    login: Option<Login>,
    phase: TestPhase,
}

fn parse_options(args: TokenStream) -> Result<Options, syn::Error> {
    let idents = Punctuated::<Ident, Token![,]>::parse_terminated.parse(args)?;

    let mut options = Options::default();
    let mut phase_set = false;
    for ident in idents {
        let login = match ident.to_string().as_str() {
            "voter" => Some(Login::Voter),
            "admin" => Some(Login::Admin),
            _ => None,
        };
        if let Some(login) = login {
            if options.login.is_some() {
                return Err(syn::Error::new(ident.span(), "Test can only log in once"));
            }
            options.login = Some(login);
            continue;
        }

        let phase = match ident.to_string().as_str() {
            "waiting" => TestPhase::Waiting,
            "active" => TestPhase::Active,
            "ended" => TestPhase::Ended,
            _ => {
                return Err(syn::Error::new(
                    ident.span(),
                    "Expected one of `voter`, `admin`, `waiting`, `active` or `ended`",
                ))
            }
        };
        if phase_set {
            return Err(syn::Error::new(ident.span(), "Test can only start in one phase"));
        }
        phase_set = true;
        options.phase = phase;
    }

    Ok(options)
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut seen = Vec::new();
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let Pat::Ident(_) = &*pat_type.pat {
                if let Type::Path(type_path) = &*pat_type.ty {
                    // Valid as the last path segment for any type is itself
                    if let Some(segment) = type_path.path.segments.last() {
                        let injected = if segment.ident == "Client" {
                            Some(quote! { rocket_client })
                        } else if segment.ident == "MemoryStore" {
                            Some(quote! { store.clone() })
                        } else if segment.ident == "ManualClock" {
                            Some(quote! { clock.clone() })
                        } else {
                            None
                        };

                        if let Some(injected) = injected {
                            let type_name = segment.ident.to_string();
                            if seen.contains(&type_name) {
                                return Err(syn::Error::new(
                                    input.span(),
                                    format!("Test cannot accept more than one `{type_name}`"),
                                ));
                            }
                            seen.push(type_name);
                            args.push(injected);
                            continue;
                        }
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client_ident: Client`, `store_ident: MemoryStore` or `clock_ident: ManualClock`",
        ));
    }

    Ok(args)
}
